//! Entry point for announcing data changes.

use std::sync::Arc;

use recall_core::{render_token_value, RecallResult, ValidationToken};
use serde::Serialize;
use tracing::warn;

use super::dependency::DependencyIndex;
use super::traits::TrackedEntity;

/// Invalidates cached results when the data behind them changes.
///
/// Mutation code calls this after a write, naming what changed; it never
/// needs to know which keys or backends hold dependent entries.
#[derive(Clone)]
pub struct InvalidationTrigger {
    index: Arc<DependencyIndex>,
}

impl InvalidationTrigger {
    pub fn new(index: Arc<DependencyIndex>) -> Self {
        Self { index }
    }

    /// Every record of `E` may have changed.
    pub async fn refresh<E: TrackedEntity>(&self) -> RecallResult<usize> {
        self.refresh_type(E::entity_name()).await
    }

    /// Records of `E` whose `property` equals `value` changed.
    pub async fn refresh_where<E, V>(&self, property: &str, value: &V) -> RecallResult<usize>
    where
        E: TrackedEntity,
        V: Serialize + ?Sized,
    {
        self.refresh_property(E::entity_name(), property, value)
            .await
    }

    /// Invalidate the entity-level token for `entity`.
    pub async fn refresh_type(&self, entity: &str) -> RecallResult<usize> {
        self.refresh_token(&ValidationToken::for_entity(entity))
            .await
    }

    /// Invalidate the token for `entity` narrowed to `property == value`.
    ///
    /// A value that cannot be rendered (it fails to serialize, is null or is
    /// blank) widens the invalidation to the entity-level token.
    pub async fn refresh_property<V: Serialize + ?Sized>(
        &self,
        entity: &str,
        property: &str,
        value: &V,
    ) -> RecallResult<usize> {
        let rendered = serde_json::to_value(value)
            .ok()
            .and_then(|v| render_token_value(&v));

        if rendered.is_none() {
            warn!(
                entity,
                property, "Property value has no token form, invalidating entity-level token"
            );
        }

        let token = DependencyIndex::resolve_token(entity, Some(property), rendered.as_deref());
        self.refresh_token(&token).await
    }

    /// Invalidate an already-composed token.
    pub async fn refresh_token(&self, token: &ValidationToken) -> RecallResult<usize> {
        self.index.invalidate(token).await
    }
}
