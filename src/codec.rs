use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Bytes produced by a codec. `Chunks` are written to the file in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Whole(Vec<u8>),
    Chunks(Vec<Vec<u8>>),
}

impl Encoded {
    pub fn len(&self) -> usize {
        match self {
            Self::Whole(bytes) => bytes.len(),
            Self::Chunks(chunks) => chunks.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Codec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Value>;
    fn encode(&self, value: &Value) -> anyhow::Result<Encoded>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode(&self, value: &Value) -> anyhow::Result<Encoded> {
        Ok(Encoded::Whole(serde_json::to_vec_pretty(value)?))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<Value> {
        let yaml_value: serde_yaml::Value = serde_yaml::from_slice(bytes)?;
        Ok(serde_json::to_value(yaml_value)?)
    }

    fn encode(&self, value: &Value) -> anyhow::Result<Encoded> {
        Ok(Encoded::Whole(serde_yaml::to_string(value)?.into_bytes()))
    }
}

/// Codecs keyed by extension, leading dot included.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    pub fn register(mut self, ext: impl Into<String>, codec: impl Codec + 'static) -> Self {
        self.codecs.insert(ext.into(), Arc::new(codec));
        self
    }

    pub fn get(&self, ext: &str) -> Option<&dyn Codec> {
        self.codecs.get(ext).map(Arc::as_ref)
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.codecs.contains_key(ext)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::empty()
            .register(".json", JsonCodec)
            .register(".yaml", YamlCodec)
            .register(".yml", YamlCodec)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.codecs.keys()).finish()
    }
}
