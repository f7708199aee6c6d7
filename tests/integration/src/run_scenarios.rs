//! Run-level scenarios across the filesystem and composition layers
//!
//! Each test loads the shipped `configs/` tree from disk, composes one or
//! more runs the way a launcher would, and checks what a training run
//! would receive.

use af3_config::{
    CommandLineOverride, Composer, Composition, ConfigNode, ConfigRegistry, Error, KeyPath,
    RegistryLoader, Resolver, Value,
};
use af3_fs::{ConfigFormat, ConfigStore};
use af3_test_utils::{alphafold3_configs, configs_dir};
use chrono::{Local, TimeZone};
use pretty_assertions::assert_eq;
use std::thread;
use tempfile::TempDir;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn registry() -> ConfigRegistry {
    RegistryLoader::new().load(&configs_dir()).unwrap()
}

fn overrides(specs: &[&str]) -> Vec<CommandLineOverride> {
    specs.iter().map(|s| s.parse().unwrap()).collect()
}

fn compose(registry: &ConfigRegistry, specs: &[&str]) -> Composition {
    let resolver = Resolver::at(Local.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        .with_env_var("PROJECT_ROOT", "/work");
    Composer::new(registry)
        .with_resolver(resolver)
        .compose_run("train", &overrides(specs))
        .unwrap()
}

fn at<'a>(tree: &'a ConfigNode, path: &str) -> Option<&'a Value> {
    tree.get_path(&path.parse::<KeyPath>().unwrap())
}

// =============================================================================
// Scenarios
// =============================================================================

/// The documented end-to-end case: `data=pdb, model=alphafold3,
/// trainer=default` plus an experiment raising the crop size and lowering
/// the learning rate.
#[test]
fn test_large_crop_experiment() {
    let registry = registry();
    let run = compose(&registry, &["experiment=large_crop"]);

    assert_eq!(run.choices["data"], "pdb");
    assert_eq!(run.choices["model"], "alphafold3");
    assert_eq!(run.choices["trainer"], "default");
    assert_eq!(at(&run.config, "data.crop_size"), Some(&Value::Integer(5120)));
    assert_eq!(at(&run.config, "model.optimizer.lr"), Some(&Value::Float(1.0e-4)));
    assert_eq!(
        at(&run.config, "data.max_msas_per_chain"),
        Some(&Value::Integer(16384))
    );
    assert_eq!(
        at(&run.config, "model.net.pairformer_stack.depth"),
        Some(&Value::Integer(48))
    );
}

/// A sweep composes many runs from one registry at once; no run sees
/// another's overrides.
#[test]
fn test_sweep_shares_one_registry() {
    let registry = registry();
    let crop_sizes = [256, 384, 512, 768];

    let runs: Vec<(i64, Composition)> = thread::scope(|scope| {
        let handles: Vec<_> = crop_sizes
            .iter()
            .map(|size| {
                let registry = &registry;
                scope.spawn(move || {
                    let spec = format!("data.crop_size={size}");
                    (*size, compose(registry, &[spec.as_str(), "trainer=gpu"]))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (size, run) in runs {
        assert_eq!(at(&run.config, "data.crop_size"), Some(&Value::Integer(size)));
        assert_eq!(at(&run.config, "trainer.devices"), Some(&Value::Integer(8)));
    }
    assert_eq!(
        registry.get("data", "pdb").unwrap().get("crop_size"),
        Some(&Value::Integer(384))
    );
}

/// The resolved config is written next to the run's outputs and read back
/// by the run driver; nothing may be lost on the way.
#[test]
fn test_resolved_config_survives_save_and_reload() {
    let run = compose(&registry(), &["experiment=atom_finetune"]);
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new();

    for file in ["config.yaml", "config.json"] {
        let path = dir.path().join(file);
        store.save(&path, &run.config).unwrap();

        let reloaded: ConfigNode = store.load(&path).unwrap();
        assert_eq!(reloaded, run.config, "{file}");
    }

    let json: serde_json::Value = serde_json::from_str(
        &store
            .render(&run.config, ConfigFormat::Json, dir.path())
            .unwrap(),
    )
    .unwrap();
    assert_eq!(json["model"]["dtype"]["_callable_"], "torch.float32");
}

/// Re-resolving a resolved tree without literal `${` changes nothing.
#[test]
fn test_resolution_is_idempotent() {
    let run = compose(&registry(), &[]);
    let again = Resolver::new().resolve(&run.config).unwrap();
    assert_eq!(again, run.config);
}

/// An escaped placeholder resolves to literal text once; the output is not
/// a fixed point of resolution.
#[test]
fn test_escaped_placeholder_resolves_to_literal_once() {
    let run = compose(&registry(), &["++trainer.note=\\${not_a_key}"]);
    assert_eq!(at(&run.config, "trainer.note"), Some(&Value::from("${not_a_key}")));

    let err = Resolver::new().resolve(&run.config).unwrap_err();
    assert!(matches!(err, Error::UnresolvedReference { .. }));
}

/// A user adds a new experiment file without touching the shipped tree.
#[test]
fn test_user_experiment_in_copied_tree() {
    let dir = alphafold3_configs()
        .file(
            "experiment/tiny.yaml",
            "defaults:\n  - override /logger: null\n\
             data:\n  crop_size: 64\n  batch_size: 4\n\
             model:\n  net:\n    pairformer_stack:\n      depth: 2\n",
        )
        .build();
    let registry = RegistryLoader::new().load(dir.path()).unwrap();

    let run = compose(&registry, &["experiment=tiny"]);

    assert!(!run.config.contains_key("logger"));
    assert!(!run.choices.contains_key("logger"));
    assert_eq!(
        at(&run.config, "model.net.pairformer_stack.depth"),
        Some(&Value::Integer(2))
    );
    assert_eq!(
        at(&run.config, "trainer.accumulate_grad_batches"),
        Some(&Value::Integer(4))
    );
}
