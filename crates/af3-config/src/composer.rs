//! Experiment composition
//!
//! [`Composer::compose`] builds a run tree from an ordered list of group
//! selections and an optional experiment overlay. [`Composer::compose_run`]
//! does the same starting from a primary config's defaults list plus
//! command-line overrides.
//!
//! Precedence, lowest first:
//!
//! 1. group selections in defaults-list order (`_self_` where it appears)
//! 2. override directives of each overlay, replacing whole group subtrees
//! 3. the remaining body of each overlay, deep merged at root scope
//! 4. command-line value overrides
//!
//! Placeholders are resolved once, after all of the above.

use std::collections::{BTreeMap, BTreeSet};

use crate::defaults::{DefaultEntry, DefaultsList, OverrideDirective};
use crate::merge::{merge_at, merge_nodes};
use crate::overrides::{CommandLineOverride, OverrideAction};
use crate::path::KeyPath;
use crate::registry::{ConfigRegistry, GroupSelection, normalize_group};
use crate::resolver::Resolver;
use crate::value::{ConfigNode, Value};
use crate::{Error, Result};

/// Group whose selections are merged at root scope by default.
pub const EXPERIMENT_GROUP: &str = "experiment";

/// A composed, fully resolved run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub config: ConfigNode,
    /// Alternative selected for each group, keyed by group name.
    pub choices: BTreeMap<String, String>,
}

/// Composes run configurations from a borrowed registry.
///
/// A composer holds no per-run state; any number of runs may be composed
/// from the same registry, concurrently if the composer is shared.
#[derive(Debug, Clone)]
pub struct Composer<'r> {
    registry: &'r ConfigRegistry,
    global_groups: BTreeSet<String>,
    resolver: Resolver,
}

impl<'r> Composer<'r> {
    pub fn new(registry: &'r ConfigRegistry) -> Self {
        Self {
            registry,
            global_groups: BTreeSet::from([EXPERIMENT_GROUP.to_string()]),
            resolver: Resolver::new(),
        }
    }

    /// Treat selections of `group` as root-scope overlays.
    pub fn with_global_group(mut self, group: &str) -> Self {
        self.global_groups.insert(normalize_group(group));
        self
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn registry(&self) -> &'r ConfigRegistry {
        self.registry
    }

    pub fn is_global_group(&self, group: &str) -> bool {
        self.global_groups.contains(&normalize_group(group))
    }

    /// Merge `defaults` in order, apply `overlay` and resolve the result.
    ///
    /// Selections of a global group are applied as overlays after the other
    /// defaults, ahead of `overlay`.
    pub fn compose(
        &self,
        defaults: &[GroupSelection],
        overlay: Option<&ConfigNode>,
    ) -> Result<ConfigNode> {
        let mut acc = Accumulator::new(self, BTreeSet::new());
        let mut tree = ConfigNode::new();
        let mut overlays = Vec::new();

        for selection in defaults {
            if self.is_global_group(&selection.group) {
                overlays.push(acc.overlay_tree(&selection.group, &selection.name)?);
                acc.choose(&selection.group, &selection.name);
            } else {
                acc.select(&mut tree, &selection.group, &selection.group, &selection.name)?;
            }
        }
        acc.merge_rooted(&mut tree)?;
        overlays.extend(overlay.cloned());
        for overlay in overlays {
            acc.apply_overlay(&mut tree, overlay)?;
        }

        tracing::debug!(
            selections = defaults.len(),
            overlay = overlay.is_some(),
            "Merged config tree"
        );
        self.resolver.resolve(&tree)
    }

    /// Compose the primary config `primary` with command-line overrides.
    ///
    /// Overrides whose key names a registry group (`data=atom`,
    /// `+experiment=finetune`, `~logger`) edit the defaults list; every
    /// other override edits the merged tree before resolution.
    pub fn compose_run(
        &self,
        primary: &str,
        overrides: &[CommandLineOverride],
    ) -> Result<Composition> {
        let mut body = self.registry.primary(primary)?.clone();
        let mut defaults = settle(DefaultsList::extract(&mut body)?)?;

        let mut explicit = BTreeSet::new();
        let mut value_overrides = Vec::new();
        for over in overrides {
            match self.group_of(over) {
                Some(group) => {
                    apply_group_override(&mut defaults, &group, over)?;
                    explicit.insert(group);
                }
                None => value_overrides.push(over),
            }
        }

        let mut acc = Accumulator::new(self, explicit);
        let mut tree = ConfigNode::new();
        let overlays = acc.expand(&mut tree, &defaults, &body, None)?;
        acc.merge_rooted(&mut tree)?;
        for overlay in overlays {
            acc.apply_overlay(&mut tree, overlay)?;
        }
        for over in value_overrides {
            over.apply(&mut tree)?;
        }
        tracing::debug!(primary, choices = ?acc.choices, "Merged run config");

        let config = self.resolver.resolve(&tree)?;
        Ok(Composition {
            config,
            choices: acc.choices,
        })
    }

    /// The registry group an override selects, if its key names one.
    fn group_of(&self, over: &CommandLineOverride) -> Option<String> {
        if over.key.contains(['.', '[']) {
            return None;
        }
        let group = normalize_group(&over.key);
        self.registry.has_group(&group).then_some(group)
    }
}

/// Folds override entries of a defaults list into the selections they
/// replace.
fn settle(list: DefaultsList) -> Result<DefaultsList> {
    let mut settled = DefaultsList::default();
    for entry in list.entries().iter().cloned() {
        match entry {
            DefaultEntry::Override(directive) => match settled.selection_mut(&directive.group) {
                Some(DefaultEntry::Select { name, .. }) => *name = directive.name,
                _ => {
                    return Err(Error::InvalidDefaults {
                        message: format!(
                            "`override {}` does not match an earlier entry",
                            directive.group
                        ),
                    });
                }
            },
            other => settled.entries_mut().push(other),
        }
    }
    Ok(settled)
}

fn apply_group_override(
    defaults: &mut DefaultsList,
    group: &str,
    over: &CommandLineOverride,
) -> Result<()> {
    let invalid = |message: String| Error::InvalidOverride {
        spec: over.spec().to_string(),
        message,
    };
    let choice = match &over.value {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .render_scalar()
                .ok_or_else(|| invalid(format!("a {} does not name an alternative", value.kind())))?,
        ),
    };

    if over.action == OverrideAction::Delete {
        let before = defaults.entries().len();
        defaults
            .entries_mut()
            .retain(|entry| !matches!(entry, DefaultEntry::Select { group: g, .. } if g == group));
        if defaults.entries().len() == before {
            return Err(invalid(format!("group `{group}` is not in the defaults list")));
        }
        return Ok(());
    }

    match (defaults.selection_mut(group), over.action) {
        (Some(DefaultEntry::Select { name, .. }), OverrideAction::Add) if name.is_some() => {
            Err(invalid(format!(
                "group `{group}` is already selected; use `{group}=...` to change it"
            )))
        }
        (Some(DefaultEntry::Select { name, optional, .. }), _) => {
            *name = choice;
            *optional = false;
            Ok(())
        }
        (_, OverrideAction::Set) => Err(invalid(format!(
            "group `{group}` is not in the defaults list; use `+{}` to add it",
            over.spec()
        ))),
        _ => {
            defaults.entries_mut().push(DefaultEntry::Select {
                group: group.to_string(),
                name: choice,
                optional: false,
                absolute: false,
            });
            Ok(())
        }
    }
}

/// Per-run composition state.
struct Accumulator<'c, 'r> {
    composer: &'c Composer<'r>,
    choices: BTreeMap<String, String>,
    /// Groups selected on the command line; overlay directives leave them be.
    explicit: BTreeSet<String>,
    /// Absolute selections met inside group alternatives, waiting to be
    /// merged at their root placement.
    rooted: Vec<(String, ConfigNode)>,
}

impl<'c, 'r> Accumulator<'c, 'r> {
    fn new(composer: &'c Composer<'r>, explicit: BTreeSet<String>) -> Self {
        Self {
            composer,
            choices: BTreeMap::new(),
            explicit,
            rooted: Vec::new(),
        }
    }

    fn choose(&mut self, group: &str, name: &str) {
        self.choices.insert(group.to_string(), name.to_string());
    }

    /// Merge `body` and the selections of `list` into `tree`. Entries are
    /// relative to `parent`; global-group selections are returned as
    /// overlays instead of merged.
    fn expand(
        &mut self,
        tree: &mut ConfigNode,
        list: &DefaultsList,
        body: &ConfigNode,
        parent: Option<&str>,
    ) -> Result<Vec<ConfigNode>> {
        let mut overlays = Vec::new();

        for entry in list.entries() {
            let DefaultEntry::Select {
                group,
                name,
                optional,
                absolute,
            } = entry
            else {
                if *entry == DefaultEntry::SelfContent {
                    merge_nodes(tree, body)?;
                }
                continue;
            };
            let full = match parent {
                Some(parent) if !absolute => format!("{parent}/{group}"),
                _ => group.clone(),
            };
            let Some(name) = name else {
                tracing::debug!(group = %full, "Defaults slot left unselected");
                continue;
            };
            if *optional && !self.composer.registry.has_option(&full, name) {
                tracing::warn!(group = %full, name = %name, "Skipping missing optional default");
                continue;
            }

            if parent.is_none() && self.composer.is_global_group(&full) {
                overlays.push(self.overlay_tree(&full, name)?);
                self.choose(&full, name);
            } else if parent.is_some() && *absolute {
                let option = self.option_tree(&full, name)?;
                self.rooted.push((full.clone(), option));
                self.choose(&full, name);
            } else {
                self.select(tree, &full, group, name)?;
            }
        }

        if !list.has_self() {
            merge_nodes(tree, body)?;
        }
        Ok(overlays)
    }

    /// Merge alternative `name` of `group` into `tree` at `placement`.
    fn select(
        &mut self,
        tree: &mut ConfigNode,
        group: &str,
        placement: &str,
        name: &str,
    ) -> Result<()> {
        let option = self.option_tree(group, name)?;
        merge_at(tree, &KeyPath::for_group(placement), &option)?;
        self.choose(group, name);
        tracing::debug!(group, name, "Merged group selection");
        Ok(())
    }

    /// Alternative `name` of `group` with its own defaults list expanded.
    fn option_tree(&mut self, group: &str, name: &str) -> Result<ConfigNode> {
        let mut body = self.composer.registry.get(group, name)?.clone();
        let list = settle(DefaultsList::extract(&mut body)?)?;
        if list.entries().is_empty() {
            return Ok(body);
        }
        let mut tree = ConfigNode::new();
        // Nested global-group selections have no root to land on; they
        // merge like any other group.
        self.expand(&mut tree, &list, &body, Some(group))?;
        Ok(tree)
    }

    /// Merge absolute selections collected from nested defaults lists at
    /// their own group path from the root.
    fn merge_rooted(&mut self, tree: &mut ConfigNode) -> Result<()> {
        for (group, option) in std::mem::take(&mut self.rooted) {
            merge_at(tree, &KeyPath::for_group(&group), &option)?;
            tracing::debug!(%group, "Merged absolute group selection");
        }
        Ok(())
    }

    /// Alternative `name` of a global group, directives left in place.
    fn overlay_tree(&self, group: &str, name: &str) -> Result<ConfigNode> {
        self.composer.registry.get(group, name).cloned()
    }

    fn apply_overlay(&mut self, tree: &mut ConfigNode, mut overlay: ConfigNode) -> Result<()> {
        for directive in OverrideDirective::extract(&mut overlay)? {
            self.apply_directive(tree, &directive)?;
        }
        merge_nodes(tree, &overlay)?;
        tracing::debug!(keys = overlay.len(), "Merged overlay");
        Ok(())
    }

    /// Replace the subtree of the directive's group wholesale.
    fn apply_directive(&mut self, tree: &mut ConfigNode, directive: &OverrideDirective) -> Result<()> {
        let group = &directive.group;
        if self.explicit.contains(group) {
            tracing::debug!(%group, "Group selected on the command line; directive skipped");
            return Ok(());
        }
        if !self.composer.registry.has_group(group) {
            return Err(Error::NotFound {
                group: group.clone(),
                name: directive.name.clone().unwrap_or_else(|| "null".to_string()),
            });
        }

        let at = KeyPath::for_group(group);
        let replacement = match &directive.name {
            Some(name) => Some(self.option_tree(group, name)?),
            None => None,
        };
        tree.remove_path(&at);
        match (replacement, &directive.name) {
            (Some(option), Some(name)) => {
                merge_at(tree, &at, &option)?;
                self.choose(group, name);
            }
            _ => {
                self.choices.remove(group);
            }
        }
        tracing::debug!(%group, name = ?directive.name, "Applied override directive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(input: &str) -> ConfigNode {
        serde_yaml::from_str(input).unwrap()
    }

    fn registry() -> ConfigRegistry {
        let mut registry = ConfigRegistry::new();
        registry.register("data", "pdb", yaml("crop_size: 384\nsampler: weighted\nroot: /data/pdb\n"));
        registry.register("data", "atom", yaml("crop_size: 256\natoms_per_window: 32\n"));
        registry.register("model", "alphafold3", yaml("dim: 384\noptimizer: {lr: 0.0018, eps: 1.0e-8}\n"));
        registry.register("trainer", "default", yaml("max_epochs: 10\ndevices: 1\n"));
        registry.register("trainer", "gpu", yaml("max_epochs: 10\ndevices: 8\naccelerator: gpu\n"));
        registry.register("experiment", "crop", yaml("data: {crop_size: 5120}\n"));
        registry.register(
            "experiment",
            "atom",
            yaml("defaults:\n  - override /data: atom\ntrainer: {max_epochs: 2}\n"),
        );
        registry
    }

    fn selections(specs: &[&str]) -> Vec<GroupSelection> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn overrides(specs: &[&str]) -> Vec<CommandLineOverride> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_compose_places_groups_under_their_keys() {
        let registry = registry();
        let composer = Composer::new(&registry);

        let tree = composer
            .compose(&selections(&["data=pdb", "trainer=default"]), None)
            .unwrap();

        assert_eq!(
            tree,
            yaml(
                "data: {crop_size: 384, sampler: weighted, root: /data/pdb}\n\
                 trainer: {max_epochs: 10, devices: 1}\n"
            )
        );
    }

    #[test]
    fn test_later_selection_wins() {
        let registry = registry();
        let composer = Composer::new(&registry);

        let tree = composer
            .compose(&selections(&["trainer=default", "trainer=gpu"]), None)
            .unwrap();

        assert_eq!(
            tree,
            yaml("trainer: {max_epochs: 10, devices: 8, accelerator: gpu}\n")
        );
    }

    #[test]
    fn test_unknown_selection_is_not_found() {
        let registry = registry();
        let err = Composer::new(&registry)
            .compose(&selections(&["data=cath"]), None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref group, ref name } if group == "data" && name == "cath"));
    }

    #[test]
    fn test_override_directive_replaces_wholesale() {
        let registry = registry();
        let composer = Composer::new(&registry);
        let overlay = yaml("\"override data\": atom\ndata: {crop_size: 128}\n");

        let tree = composer
            .compose(&selections(&["data=pdb"]), Some(&overlay))
            .unwrap();

        assert_eq!(tree, yaml("data: {crop_size: 128, atoms_per_window: 32}\n"));
    }

    #[test]
    fn test_override_directive_for_unknown_group_fails() {
        let registry = registry();
        let overlay = yaml("\"override optimizer\": adam\n");
        let err = Composer::new(&registry)
            .compose(&selections(&["data=pdb"]), Some(&overlay))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref group, .. } if group == "optimizer"));
    }

    #[test]
    fn test_null_directive_clears_subtree() {
        let registry = registry();
        let overlay = yaml("\"override trainer\": null\n");
        let tree = Composer::new(&registry)
            .compose(&selections(&["data=atom", "trainer=gpu"]), Some(&overlay))
            .unwrap();
        assert_eq!(tree, yaml("data: {crop_size: 256, atoms_per_window: 32}\n"));
    }

    #[test]
    fn test_interpolation_sees_overlay_values() {
        let mut registry = ConfigRegistry::new();
        registry.register("base", "default", yaml("a: 1\nb: ${base.a}\n"));
        let overlay = yaml("base: {a: 2}\n");

        let tree = Composer::new(&registry)
            .compose(&selections(&["base=default"]), Some(&overlay))
            .unwrap();

        assert_eq!(tree, yaml("base: {a: 2, b: 2}\n"));
    }

    #[test]
    fn test_merge_conflict_reports_path() {
        let registry = registry();
        let overlay = yaml("model: {optimizer: 0.1}\n");
        let err = Composer::new(&registry)
            .compose(&selections(&["model=alphafold3"]), Some(&overlay))
            .unwrap_err();
        match err {
            Error::MergeConflict { path, .. } => assert_eq!(path.to_string(), "model.optimizer"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_experiment_selection_is_an_overlay() {
        let registry = registry();
        let tree = Composer::new(&registry)
            .compose(&selections(&["experiment=crop", "data=pdb"]), None)
            .unwrap();

        assert_eq!(
            tree.get_path(&"data.crop_size".parse().unwrap()),
            Some(&Value::Integer(5120))
        );
        assert!(!tree.contains_key("experiment"));
    }

    fn primary_registry() -> ConfigRegistry {
        let mut registry = registry();
        registry.register_primary(
            "train",
            yaml(
                "defaults:\n\
                 \x20 - data: pdb\n\
                 \x20 - model: alphafold3\n\
                 \x20 - trainer: default\n\
                 \x20 - optional logger: wandb\n\
                 \x20 - _self_\n\
                 \x20 - experiment: null\n\
                 seed: 42\n\
                 trainer: {devices: 2}\n",
            ),
        );
        registry
    }

    #[test]
    fn test_compose_run_follows_defaults_list() {
        let registry = primary_registry();
        let run = Composer::new(&registry).compose_run("train", &[]).unwrap();

        assert_eq!(run.config.get("seed"), Some(&Value::Integer(42)));
        assert_eq!(
            run.config.get_path(&"trainer.devices".parse().unwrap()),
            Some(&Value::Integer(2))
        );
        assert!(!run.config.contains_key("logger"));
        assert!(!run.config.contains_key("defaults"));
        assert_eq!(
            run.choices,
            BTreeMap::from([
                ("data".to_string(), "pdb".to_string()),
                ("model".to_string(), "alphafold3".to_string()),
                ("trainer".to_string(), "default".to_string()),
            ])
        );
    }

    #[test]
    fn test_compose_run_with_experiment_and_overrides() {
        let registry = primary_registry();
        let run = Composer::new(&registry)
            .compose_run(
                "train",
                &overrides(&["experiment=atom", "trainer=gpu", "model.optimizer.lr=1e-4"]),
            )
            .unwrap();

        // The experiment swaps data for atom and shortens training.
        assert_eq!(
            run.config.get("data"),
            Some(&Value::Node(yaml("crop_size: 256\natoms_per_window: 32\n")))
        );
        assert_eq!(
            run.config.get("trainer"),
            Some(&Value::Node(yaml("max_epochs: 2\ndevices: 2\naccelerator: gpu\n")))
        );
        assert_eq!(
            run.config.get_path(&"model.optimizer.lr".parse().unwrap()),
            Some(&Value::Float(1e-4))
        );
        assert_eq!(run.choices.get("data").map(String::as_str), Some("atom"));
        assert_eq!(run.choices.get("experiment").map(String::as_str), Some("atom"));
    }

    #[test]
    fn test_command_line_selection_beats_directive() {
        let registry = primary_registry();
        let run = Composer::new(&registry)
            .compose_run("train", &overrides(&["experiment=atom", "data=pdb"]))
            .unwrap();

        assert_eq!(run.choices.get("data").map(String::as_str), Some("pdb"));
        assert_eq!(
            run.config.get_path(&"data.crop_size".parse().unwrap()),
            Some(&Value::Integer(384))
        );
    }

    #[test]
    fn test_group_overrides_edit_defaults_list() {
        let registry = primary_registry();
        let composer = Composer::new(&registry);

        let run = composer.compose_run("train", &overrides(&["~trainer"])).unwrap();
        assert_eq!(run.config.get("trainer"), Some(&Value::Node(yaml("devices: 2\n"))));

        let err = composer
            .compose_run("train", &overrides(&["data=cath"]))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let err = composer
            .compose_run("train", &overrides(&["+data=atom"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOverride { .. }));

        let run = composer
            .compose_run("train", &overrides(&["+experiment=crop"]))
            .unwrap();
        assert_eq!(
            run.config.get_path(&"data.crop_size".parse().unwrap()),
            Some(&Value::Integer(5120))
        );
    }

    #[test]
    fn test_value_override_requires_existing_key() {
        let registry = primary_registry();
        let composer = Composer::new(&registry);

        let err = composer
            .compose_run("train", &overrides(&["data.shuffle=true"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOverride { .. }));

        let run = composer
            .compose_run("train", &overrides(&["+data.shuffle=true"]))
            .unwrap();
        assert_eq!(
            run.config.get_path(&"data.shuffle".parse().unwrap()),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_unknown_primary() {
        let registry = registry();
        let err = Composer::new(&registry).compose_run("eval", &[]).unwrap_err();
        assert!(matches!(err, Error::PrimaryNotFound { .. }));
    }

    #[test]
    fn test_primary_override_entry_replaces_selection() {
        let mut registry = registry();
        registry.register_primary(
            "train",
            yaml("defaults:\n  - data: pdb\n  - override data: atom\n"),
        );
        let run = Composer::new(&registry).compose_run("train", &[]).unwrap();
        assert_eq!(run.choices.get("data").map(String::as_str), Some("atom"));

        registry.register_primary("broken", yaml("defaults:\n  - override data: atom\n"));
        let err = Composer::new(&registry).compose_run("broken", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidDefaults { .. }));
    }

    #[test]
    fn test_nested_defaults_are_relative_to_their_group() {
        let mut registry = ConfigRegistry::new();
        registry.register(
            "model",
            "alphafold3",
            yaml("defaults:\n  - net: small\n  - _self_\nname: af3\nnet: {depth: 4}\n"),
        );
        registry.register("model/net", "small", yaml("dim: 128\ndepth: 2\n"));

        let tree = Composer::new(&registry)
            .compose(&selections(&["model=alphafold3"]), None)
            .unwrap();

        assert_eq!(tree, yaml("model: {net: {dim: 128, depth: 4}, name: af3}\n"));
    }

    #[test]
    fn test_absolute_nested_default_selects_from_root() {
        let mut registry = registry();
        registry.register(
            "model",
            "atom_model",
            yaml("defaults:\n  - /data: atom\n  - _self_\ndim: 64\n"),
        );
        registry.register_primary("train", yaml("defaults:\n  - model: atom_model\n"));

        let run = Composer::new(&registry).compose_run("train", &[]).unwrap();

        assert_eq!(
            run.config,
            yaml("model: {dim: 64}\ndata: {crop_size: 256, atoms_per_window: 32}\n")
        );
        assert_eq!(run.choices.get("data").map(String::as_str), Some("atom"));
        assert!(!run.choices.contains_key("model/data"));
    }
}
