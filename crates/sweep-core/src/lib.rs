use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BASE_VARIANT: &str = "base";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Benchmark {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Variant {
    pub name: String,
}

impl Variant {
    pub fn is_base(&self) -> bool {
        self.name == BASE_VARIANT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Method {
    pub name: String,
}

/// Identity of one unit of work. The persisted form is `result_file_name`;
/// a task is complete exactly when a file with that name exists in the
/// results directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    pub bench: String,
    pub method: String,
    pub variant: String,
    pub property: String,
    pub fuel: Option<u32>,
}

impl TaskKey {
    pub fn result_file_name(&self) -> String {
        match self.fuel {
            Some(fuel) => format!(
                "{:02},{},{},{},{}.json",
                fuel, self.bench, self.method, self.variant, self.property
            ),
            None => format!(
                "{},{},{},{}.json",
                self.bench, self.method, self.variant, self.property
            ),
        }
    }

    pub fn parse_file_name(name: &str) -> Option<TaskKey> {
        let stem = name.strip_suffix(".json")?;
        let parts: Vec<&str> = stem.split(',').collect();
        match parts.as_slice() {
            [fuel, bench, method, variant, property] => Some(TaskKey {
                bench: bench.to_string(),
                method: method.to_string(),
                variant: variant.to_string(),
                property: property.to_string(),
                fuel: Some(fuel.parse().ok()?),
            }),
            [bench, method, variant, property] => Some(TaskKey {
                bench: bench.to_string(),
                method: method.to_string(),
                variant: variant.to_string(),
                property: property.to_string(),
                fuel: None,
            }),
            _ => None,
        }
    }
}

/// Per-benchmark task configuration (`<bench>_exp_cfg.json`): variant name
/// to the list of property identifiers worth running against that mutant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<String>>,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn knows_variant(&self, variant: &str) -> bool {
        self.tasks.contains_key(variant)
    }

    // Allow-list entries carry the harness-side test_ prefix; properties
    // are handled bare everywhere else.
    pub fn allows(&self, variant: &str, property: &str) -> bool {
        match self.tasks.get(variant) {
            Some(props) => {
                let full = format!("test_{}", property);
                props.iter().any(|p| *p == full)
            }
            None => false,
        }
    }
}

pub struct SweepDims<'a> {
    pub bench: &'a str,
    pub variants: &'a [Variant],
    pub properties: &'a [String],
    pub methods: &'a [String],
    pub fuel_sizes: &'a [u32],
}

/// The candidate task set: {variant} x {property} x {method} x {fuel},
/// never including the unmutated base control. With a config, a
/// (variant, property) pair survives only if the allow-list has it;
/// without one every pair does.
pub fn candidate_tasks(dims: &SweepDims, cfg: Option<&BenchConfig>) -> BTreeSet<TaskKey> {
    let mut tasks = BTreeSet::new();
    for variant in dims.variants {
        if variant.is_base() {
            continue;
        }
        for property in dims.properties {
            if let Some(cfg) = cfg {
                if !cfg.allows(&variant.name, property) {
                    continue;
                }
            }
            for method in dims.methods {
                for &fuel in dims.fuel_sizes {
                    tasks.insert(TaskKey {
                        bench: dims.bench.to_string(),
                        method: method.clone(),
                        variant: variant.name.clone(),
                        property: property.clone(),
                        fuel: Some(fuel),
                    });
                }
            }
        }
    }
    tasks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub remaining: BTreeSet<TaskKey>,
    pub remaining_variants: Vec<String>,
}

pub fn reconcile(candidates: &BTreeSet<TaskKey>, finished: &BTreeSet<String>) -> Reconciled {
    let remaining: BTreeSet<TaskKey> = candidates
        .iter()
        .filter(|task| !finished.contains(&task.result_file_name()))
        .cloned()
        .collect();
    let mut remaining_variants: Vec<String> =
        remaining.iter().map(|task| task.variant.clone()).collect();
    remaining_variants.sort();
    remaining_variants.dedup();
    Reconciled {
        remaining,
        remaining_variants,
    }
}

pub fn list_finished(results_dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(results_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}

pub fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    Ok(sha256_bytes(&fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(names: &[&str]) -> Vec<Variant> {
        names
            .iter()
            .map(|n| Variant {
                name: n.to_string(),
            })
            .collect()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn red_black_cfg() -> BenchConfig {
        serde_json::from_str(
            r#"{"tasks": {"insert_mutant1": ["test_prop1", "test_prop2"]}}"#,
        )
        .expect("config literal")
    }

    fn red_black_dims<'a>(
        variants: &'a [Variant],
        properties: &'a [String],
        methods: &'a [String],
        fuel_sizes: &'a [u32],
    ) -> SweepDims<'a> {
        SweepDims {
            bench: "RedBlack",
            variants,
            properties,
            methods,
            fuel_sizes,
        }
    }

    #[test]
    fn base_variant_is_never_a_candidate() {
        let variants = variants(&["base", "insert_mutant1"]);
        let properties = strings(&["prop1", "prop2"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100, 1000, 10000];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);

        let tasks = candidate_tasks(&dims, Some(&red_black_cfg()));
        assert!(!tasks.is_empty());
        assert!(tasks.iter().all(|t| t.variant != "base"));

        let tasks = candidate_tasks(&dims, None);
        assert!(tasks.iter().all(|t| t.variant != "base"));
    }

    #[test]
    fn allow_list_controls_inclusion() {
        let variants = variants(&["insert_mutant1", "delete_mutant2"]);
        let properties = strings(&["prop1", "prop2", "prop3"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);

        let tasks = candidate_tasks(&dims, Some(&red_black_cfg()));
        for task in &tasks {
            assert_eq!(task.variant, "insert_mutant1");
            assert!(task.property == "prop1" || task.property == "prop2");
        }
        // prop3 is not in the allow-list; delete_mutant2 has no entry at all.
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn unconfigured_suite_enumerates_every_pair() {
        let variants = variants(&["base", "shift_mutant"]);
        let properties = strings(&["progress", "preservation"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100];
        let dims = SweepDims {
            bench: "STLC",
            variants: &variants,
            properties: &properties,
            methods: &methods,
            fuel_sizes: &sizes,
        };
        let tasks = candidate_tasks(&dims, None);
        assert_eq!(tasks.len(), 4);
    }

    #[test]
    fn red_black_worked_example() {
        let variants = variants(&["insert_mutant1"]);
        let properties = strings(&["prop1", "prop2"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100, 1000, 10000];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);

        let tasks = candidate_tasks(&dims, Some(&red_black_cfg()));
        assert_eq!(tasks.len(), 8);

        let names: BTreeSet<String> = tasks.iter().map(|t| t.result_file_name()).collect();
        assert!(names.contains("07,RedBlack,TypeBasedFuzzer,insert_mutant1,prop1.json"));
        assert!(names.contains("10000,RedBlack,TypeBasedFuzzer,insert_mutant1,prop2.json"));
    }

    #[test]
    fn finished_file_removes_exactly_that_task() {
        let variants = variants(&["insert_mutant1"]);
        let properties = strings(&["prop1", "prop2"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100, 1000, 10000];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);
        let candidates = candidate_tasks(&dims, Some(&red_black_cfg()));

        let mut finished = BTreeSet::new();
        finished.insert("100,RedBlack,TypeBasedFuzzer,insert_mutant1,prop1.json".to_string());
        let reconciled = reconcile(&candidates, &finished);

        assert_eq!(reconciled.remaining.len(), 7);
        let prop1_fuels: Vec<u32> = reconciled
            .remaining
            .iter()
            .filter(|t| t.property == "prop1")
            .map(|t| t.fuel.expect("fuel"))
            .collect();
        assert_eq!(prop1_fuels, vec![7, 1000, 10000]);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let variants = variants(&["insert_mutant1"]);
        let properties = strings(&["prop1", "prop2"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);
        let candidates = candidate_tasks(&dims, Some(&red_black_cfg()));

        let mut finished = BTreeSet::new();
        finished.insert("07,RedBlack,TypeBasedFuzzer,insert_mutant1,prop2.json".to_string());
        let first = reconcile(&candidates, &finished);
        let second = reconcile(&candidates, &finished);
        assert_eq!(first, second);
    }

    #[test]
    fn completed_task_never_reappears() {
        let variants = variants(&["insert_mutant1"]);
        let properties = strings(&["prop1"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100];
        let dims = red_black_dims(&variants, &properties, &methods, &sizes);
        let candidates = candidate_tasks(&dims, Some(&red_black_cfg()));

        let mut finished = BTreeSet::new();
        for task in &candidates {
            finished.insert(task.result_file_name());
            let reconciled = reconcile(&candidates, &finished);
            assert!(!reconciled.remaining.contains(task));
        }
        assert!(reconcile(&candidates, &finished).remaining.is_empty());
    }

    #[test]
    fn remaining_variants_are_sorted_and_deduped() {
        let variants = variants(&["zeta_mutant", "alpha_mutant"]);
        let properties = strings(&["progress"]);
        let methods = strings(&["TypeBasedFuzzer"]);
        let sizes = [7, 100];
        let dims = SweepDims {
            bench: "STLC",
            variants: &variants,
            properties: &properties,
            methods: &methods,
            fuel_sizes: &sizes,
        };
        let candidates = candidate_tasks(&dims, None);
        let reconciled = reconcile(&candidates, &BTreeSet::new());
        assert_eq!(
            reconciled.remaining_variants,
            vec!["alpha_mutant".to_string(), "zeta_mutant".to_string()]
        );
    }

    #[test]
    fn file_name_zero_pads_small_fuel() {
        let task = TaskKey {
            bench: "BinarySearchTree".to_string(),
            method: "TypeBasedFuzzer".to_string(),
            variant: "insert_mutant1".to_string(),
            property: "prop1".to_string(),
            fuel: Some(7),
        };
        assert_eq!(
            task.result_file_name(),
            "07,BinarySearchTree,TypeBasedFuzzer,insert_mutant1,prop1.json"
        );
    }

    #[test]
    fn file_name_round_trips_through_parse() {
        let with_fuel = TaskKey {
            bench: "RedBlack".to_string(),
            method: "TypeBasedFuzzer".to_string(),
            variant: "insert_mutant1".to_string(),
            property: "prop2".to_string(),
            fuel: Some(1000),
        };
        assert_eq!(
            TaskKey::parse_file_name(&with_fuel.result_file_name()),
            Some(with_fuel)
        );

        let without_fuel = TaskKey {
            bench: "RedBlack".to_string(),
            method: "Correct".to_string(),
            variant: "base".to_string(),
            property: "prop1".to_string(),
            fuel: None,
        };
        assert_eq!(
            TaskKey::parse_file_name(&without_fuel.result_file_name()),
            Some(without_fuel)
        );

        assert_eq!(TaskKey::parse_file_name("notes.txt"), None);
        assert_eq!(TaskKey::parse_file_name("a,b.json"), None);
    }

    #[test]
    fn config_load_and_membership() {
        let dir = std::env::temp_dir().join(format!(
            "sweep_cfg_test_{}",
            std::process::id()
        ));
        ensure_dir(&dir).expect("scratch dir");
        let path = dir.join("RedBlack_exp_cfg.json");
        fs::write(
            &path,
            r#"{"tasks": {"insert_mutant1": ["test_prop1", "test_prop2"]}}"#,
        )
        .expect("write config");

        let cfg = BenchConfig::load(&path).expect("load config");
        assert!(cfg.knows_variant("insert_mutant1"));
        assert!(!cfg.knows_variant("delete_mutant2"));
        assert!(cfg.allows("insert_mutant1", "prop1"));
        assert!(!cfg.allows("insert_mutant1", "prop3"));
        assert!(!cfg.allows("delete_mutant2", "prop1"));

        assert!(BenchConfig::load(&dir.join("missing.json")).is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
