use std::collections::BTreeMap;
use std::sync::Arc;

use crate::channel::ChannelError;

/// Host-side callable reachable from a running kernel. Payloads are
/// opaque byte slices; the wire encoding belongs to the channel.
pub type HostCallable = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, ChannelError> + Send + Sync>;

/// Fault names the device runtime may raise, preallocated into every
/// embedding map at stable string indices starting at 0.
pub const RUNTIME_FAULT_NAMES: &[&str] = &[
    "TimelineUnderflow",
    "TimelineOverflow",
    "DestinationUnreachable",
    "DmaFault",
    "I2cFault",
    "CacheFault",
    "SpiFault",
    "ClockFailure",
];

/// Table linking synthetic identifiers assigned during compilation to
/// the host objects and strings an artifact may reference remotely.
/// Built fresh for every compile call and consumed during the serve
/// phase; never persisted.
#[derive(Default)]
pub struct EmbeddingMap {
    objects: BTreeMap<u32, HostCallable>,
    object_ids: BTreeMap<usize, u32>,
    strings: Vec<String>,
    string_ids: BTreeMap<String, u32>,
    functions: BTreeMap<u32, HostCallable>,
}

impl EmbeddingMap {
    pub fn new() -> Self {
        let mut map = Self::default();
        for (i, name) in RUNTIME_FAULT_NAMES.iter().enumerate() {
            let id = map.store_str(name);
            debug_assert_eq!(id as usize, i);
        }
        map
    }

    /// Intern a string, returning its stable index.
    pub fn store_str(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.string_ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        id
    }

    /// Store a host object, deduplicated by identity. Keys start at 1;
    /// 0 is reserved as the null reference on the device side.
    pub fn store_object(&mut self, obj: HostCallable) -> u32 {
        let identity = Arc::as_ptr(&obj) as *const () as usize;
        if let Some(&key) = self.object_ids.get(&identity) {
            return key;
        }
        let key = self.objects.len() as u32 + 1;
        self.objects.insert(key, obj);
        self.object_ids.insert(identity, key);
        key
    }

    /// Store a callable under a caller-chosen key.
    pub fn store_function(&mut self, key: u32, function: HostCallable) -> u32 {
        self.functions.insert(key, function);
        key
    }

    pub fn retrieve_str(&self, id: u32) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    pub fn retrieve_object(&self, key: u32) -> Option<&HostCallable> {
        self.objects.get(&key)
    }

    pub fn retrieve_function(&self, key: u32) -> Option<&HostCallable> {
        self.functions.get(&key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }
}

impl std::fmt::Debug for EmbeddingMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingMap")
            .field("objects", &self.objects.len())
            .field("strings", &self.strings.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}
