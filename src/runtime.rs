//! Lightweight deterministic runtime for agents: seeded generators and a
//! stable state digest, without compiling or running a sketch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::generators::{hash_text_seed, seed_key, NoiseField, Prng};
use crate::protocol::{RenderMode, SDK_VERSION};
use crate::vars::ProtocolVariables;

/// A numeric seed or a text seed hashed to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(i64),
    Text(String),
}

impl Seed {
    /// The 32-bit generator key.
    pub fn key(&self) -> u32 {
        match self {
            Seed::Number(n) => seed_key(*n),
            Seed::Text(text) => hash_text_seed(text),
        }
    }
}

impl From<i64> for Seed {
    fn from(value: i64) -> Self {
        Seed::Number(value)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Seed::Text(value.to_string())
    }
}

/// Options for [`DeterministicRuntime::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub seed: Seed,
    pub vars: Vec<f64>,
    pub mode: RenderMode,
    pub metadata: Option<Value>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            seed: Seed::Number(0),
            vars: Vec::new(),
            mode: RenderMode::Static,
            metadata: None,
        }
    }
}

/// Serializable runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub sdk_version: String,
    pub seed: u32,
    pub vars: ProtocolVariables,
    pub mode: RenderMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl RuntimeState {
    /// sha256 hex of the canonical (sorted-key) JSON form.
    ///
    /// Depends only on the record's contents, never on key insertion order.
    pub fn digest(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        let canonical = canonical_json(&value)?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

/// Seeded random and noise for agent-side reasoning about a configuration.
#[derive(Debug, Clone)]
pub struct DeterministicRuntime {
    key: u32,
    prng: Prng,
    noise: NoiseField,
    vars: ProtocolVariables,
    mode: RenderMode,
    metadata: Option<Value>,
}

impl DeterministicRuntime {
    /// Validate `options.vars` and seed both generators.
    pub fn new(options: RuntimeOptions) -> Result<Self> {
        let vars = ProtocolVariables::normalize(&options.vars)?;
        let key = options.seed.key();
        Ok(Self {
            key,
            prng: Prng::new(key),
            noise: NoiseField::new(key),
            vars,
            mode: options.mode,
            metadata: options.metadata,
        })
    }

    /// Next float in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.prng.next_f64()
    }

    /// Next integer in `[min, max]`.
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        self.prng.int_inclusive(min, max)
    }

    /// Next float in `[min, max)`.
    pub fn random_range(&mut self, min: f64, max: f64) -> f64 {
        self.prng.range(min, max)
    }

    /// Single-octave noise in `[0, 1]`.
    pub fn noise(&self, x: f64, y: f64, z: f64) -> f64 {
        self.noise.sample(x, y, z)
    }

    /// The 32-bit generator key.
    pub fn seed(&self) -> u32 {
        self.key
    }

    pub fn vars(&self) -> ProtocolVariables {
        self.vars
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState {
            sdk_version: SDK_VERSION.to_string(),
            seed: self.key,
            vars: self.vars,
            mode: self.mode,
            metadata: self.metadata.clone(),
        }
    }

    pub fn digest(&self) -> Result<String> {
        self.state().digest()
    }
}

/// Serialize `value` with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut parts = Vec::with_capacity(keys.len());
            for key in keys {
                parts.push(format!(
                    "{}:{}",
                    serde_json::to_string(key)?,
                    canonical_json(&map[key])?
                ));
            }
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts = items.iter().map(canonical_json).collect::<Result<Vec<_>>>()?;
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_options_same_stream() {
        let options = RuntimeOptions {
            seed: Seed::Number(42),
            ..Default::default()
        };
        let mut a = DeterministicRuntime::new(options.clone()).unwrap();
        let mut b = DeterministicRuntime::new(options).unwrap();

        for _ in 0..20 {
            assert_eq!(a.random(), b.random());
        }
        assert_eq!(a.noise(0.1, 0.2, 0.3), b.noise(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_text_seed_is_hashed() {
        let runtime = DeterministicRuntime::new(RuntimeOptions {
            seed: Seed::from("a"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(runtime.seed(), 97);
    }

    #[test]
    fn test_random_int_is_inclusive() {
        let mut runtime = DeterministicRuntime::new(RuntimeOptions::default()).unwrap();
        for _ in 0..200 {
            let v = runtime.random_int(-2, 2);
            assert!((-2..=2).contains(&v));
        }
    }

    #[test]
    fn test_random_int_handles_full_range() {
        let mut runtime = DeterministicRuntime::new(RuntimeOptions::default()).unwrap();
        for _ in 0..200 {
            assert!(runtime.random_int(0, i64::MAX) >= 0);
        }
        let _ = runtime.random_int(i64::MIN, i64::MAX);
    }

    #[test]
    fn test_invalid_vars_are_rejected() {
        let err = DeterministicRuntime::new(RuntimeOptions {
            vars: vec![150.0],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_digest_ignores_metadata_key_order() {
        let with_metadata = |metadata: Value| {
            DeterministicRuntime::new(RuntimeOptions {
                seed: Seed::Number(5),
                vars: vec![10.0, 20.0],
                mode: RenderMode::Loop,
                metadata: Some(metadata),
            })
            .unwrap()
            .digest()
            .unwrap()
        };

        let mut forward = serde_json::Map::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!({"y": 2, "x": 3}));
        let mut backward = serde_json::Map::new();
        backward.insert("b".to_string(), json!({"x": 3, "y": 2}));
        backward.insert("a".to_string(), json!(1));

        assert_eq!(
            with_metadata(Value::Object(forward)),
            with_metadata(Value::Object(backward))
        );
    }

    #[test]
    fn test_digest_changes_with_configuration() {
        let digest = |seed: i64| {
            DeterministicRuntime::new(RuntimeOptions {
                seed: Seed::Number(seed),
                ..Default::default()
            })
            .unwrap()
            .digest()
            .unwrap()
        };
        assert_eq!(digest(1), digest(1));
        assert_ne!(digest(1), digest(2));
        assert_eq!(digest(1).len(), 64);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": [{"d": 1, "c": 2}], "a": "x\"y"});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":"x\"y","b":[{"c":2,"d":1}]}"#
        );
    }
}
