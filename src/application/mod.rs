// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command each.
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - File formats live in Layers 4 and 6
//   - Only workflow coordination

// Pretrain the reference LightGCN
pub mod pretrain_use_case;

// The fairness-constrained training run
pub mod train_use_case;

// Score a saved encoder
pub mod evaluate_use_case;

#[cfg(test)]
mod tests {
    use super::{
        evaluate_use_case::{EvaluateConfig, EvaluateUseCase},
        pretrain_use_case::{PretrainConfig, PretrainUseCase},
        train_use_case::{TrainConfig, TrainUseCase},
    };
    use crate::domain::bundle::fixtures::toy_bundle;
    use serde_json::json;

    fn write_toy_dataset(dir: &std::path::Path) -> String {
        let b = toy_bundle();
        let doc = json!({
            "n_users":   b.n_users,
            "n_items":   b.n_items,
            "train_u2i": b.train_u2i,
            "test_u2i":  b.test_u2i,
            "user_side_features": { "gender": [0, 0, 1, 1] },
        });
        let path = dir.join("toy.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_pretrain_train_evaluate_end_to_end() {
        let dir     = tempfile::tempdir().unwrap();
        let root    = dir.path().display().to_string();
        let dataset = write_toy_dataset(dir.path());
        let base    = format!("{root}/param/gcn_base_toy");

        let pretrain = PretrainUseCase::new(PretrainConfig {
            dataset:     dataset.clone(),
            emb_size:    8,
            n_layers:    2,
            lr:          0.01,
            batch_size:  4,
            num_workers: 1,
            num_epochs:  2,
            seed:        Some(1),
            log_path:    format!("{root}/logs/base_"),
            param_path:  base.clone(),
            ..PretrainConfig::default()
        })
        .unwrap();
        let pre_outcome = pretrain.execute().unwrap();
        assert!(pre_outcome.best_report.is_some());
        assert!(pretrain.paths().metrics.exists());

        let train = TrainUseCase::new(TrainConfig {
            dataset:       dataset.clone(),
            emb_size:      8,
            n_layers:      2,
            lr:            0.01,
            batch_size:    4,
            num_workers:   1,
            sim_epochs:    3,
            num_epochs:    2,
            seed:          Some(2),
            log_path:      format!("{root}/logs/fm_"),
            param_path:    format!("{root}/param/fm_"),
            pretrain_path: base,
            ..TrainConfig::default()
        })
        .unwrap();
        let outcome = train.execute().unwrap();
        assert!(outcome.best_epoch.is_some());

        let checkpoint = train.paths().checkpoint.display().to_string();
        assert!(checkpoint.contains("lareg=0.5_ib_reg=30.0_sigma=0.35 "));

        let report = EvaluateUseCase::new(EvaluateConfig {
            checkpoint,
            dataset,
            num_workers: 1,
            ..EvaluateConfig::default()
        })
        .unwrap()
        .execute()
        .unwrap();
        assert_eq!(report.evaluated_users, 4);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(TrainUseCase::new(cfg).is_err());
        let cfg = TrainConfig { tau: 0.0, ..TrainConfig::default() };
        assert!(TrainUseCase::new(cfg).is_err());
    }

    #[test]
    fn test_missing_pretrained_encoder_fails() {
        let dir     = tempfile::tempdir().unwrap();
        let root    = dir.path().display().to_string();
        let dataset = write_toy_dataset(dir.path());

        let train = TrainUseCase::new(TrainConfig {
            dataset,
            log_path:      format!("{root}/logs/fm_"),
            param_path:    format!("{root}/param/fm_"),
            pretrain_path: format!("{root}/param/absent"),
            ..TrainConfig::default()
        })
        .unwrap();
        assert!(train.execute().is_err());
    }
}
