//! Runtime configuration, loaded from TOML (the pack's preferred
//! small-config format — see `raya-cli`'s `toml` dependency) in place
//! of the teacher's RON, which was tied to the dashboard's scene
//! format and has nothing to carry over.

use serde::Deserialize;

/// Sizing knobs for the heap and the dual stacks, standing in for the
/// original's compile-time `heap_space[4096]`/stack-size constants
/// (`db_compiler.c`'s `InitCompiler`).
#[derive(Deserialize, Debug, Copy, Clone)]
#[serde(default)]
pub struct Config {
    pub max_objects: usize,
    pub max_heap_bytes: usize,
    pub stack_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { max_objects: 4096, max_heap_bytes: 1 << 20, stack_capacity: 1024 }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn heap_limits(&self) -> crate::heap::HeapLimits {
        crate::heap::HeapLimits { max_objects: self.max_objects, max_bytes: self.max_heap_bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_toml_is_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.max_objects, 4096);
    }

    #[test]
    fn overrides_individual_fields() {
        let config = Config::from_toml("stack_capacity = 64\n").unwrap();
        assert_eq!(config.stack_capacity, 64);
        assert_eq!(config.max_objects, 4096);
    }
}
