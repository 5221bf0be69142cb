//! Decompression context registry.
//!
//! Maps CIDs to per-flow decompression contexts. The registry is a plain
//! value owned by the engine; callers running multiple channels own one
//! engine (and thus one registry) per channel, so no locking lives here.

use std::collections::HashMap;

use crate::error::DecompressionError;
use crate::profiles::generic::GenericDecompressorContext;
use crate::types::ContextId;

/// Registry of active decompression contexts, keyed by CID.
#[derive(Debug, Default)]
pub struct ContextManager {
    contexts: HashMap<ContextId, GenericDecompressorContext>,
}

impl ContextManager {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the context for a CID.
    pub fn add_context(&mut self, cid: ContextId, context: GenericDecompressorContext) {
        self.contexts.insert(cid, context);
    }

    /// Immutable context lookup.
    ///
    /// # Errors
    /// - [`DecompressionError::NoContext`] - No context exists for the CID
    pub fn get_context(
        &self,
        cid: ContextId,
    ) -> Result<&GenericDecompressorContext, DecompressionError> {
        self.contexts
            .get(&cid)
            .ok_or(DecompressionError::NoContext { cid })
    }

    /// Mutable context lookup.
    ///
    /// # Errors
    /// - [`DecompressionError::NoContext`] - No context exists for the CID
    pub fn get_context_mut(
        &mut self,
        cid: ContextId,
    ) -> Result<&mut GenericDecompressorContext, DecompressionError> {
        self.contexts
            .get_mut(&cid)
            .ok_or(DecompressionError::NoContext { cid })
    }

    /// Whether a context exists for the CID.
    pub fn contains(&self, cid: ContextId) -> bool {
        self.contexts.contains_key(&cid)
    }

    /// Removes the context for a CID, returning it if it existed.
    pub fn remove_context(&mut self, cid: ContextId) -> Option<GenericDecompressorContext> {
        self.contexts.remove(&cid)
    }

    /// Drops every context (channel teardown).
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    /// Number of active contexts.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Iterates over active contexts, e.g. for staleness pruning.
    pub fn iter(&self) -> impl Iterator<Item = (&ContextId, &GenericDecompressorContext)> {
        self.contexts.iter()
    }
}
