//! Entity <-> stored body conversion.

use super::error::{RepoError, RepoResult};
use crate::model::entity::{Entity, EntityKey, KeyValue};
use crate::session::Mutation;
use serde_json::Value;

pub(crate) fn encode<T: Entity>(entity: &T) -> RepoResult<Value> {
    serde_json::to_value(entity)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {}: {err}", T::KIND)))
}

pub(crate) fn decode<T: Entity>(body: Value) -> RepoResult<T> {
    serde_json::from_value(body)
        .map_err(|err| RepoError::InvalidData(format!("cannot decode {}: {err}", T::KIND)))
}

pub(crate) fn decode_all<T: Entity>(bodies: Vec<Value>) -> RepoResult<Vec<T>> {
    bodies.into_iter().map(decode::<T>).collect()
}

/// Key of an entity that must already carry its identity.
pub(crate) fn assigned_key<T: Entity>(entity: &T) -> RepoResult<KeyValue> {
    let id = entity.id();
    if id.is_unassigned() {
        return Err(RepoError::invalid_argument(format!(
            "{} has no identifier; add it before updating or deleting",
            T::KIND
        )));
    }
    Ok(id.to_key_value())
}

pub(crate) fn update_of<T: Entity>(entity: &T) -> RepoResult<Mutation> {
    entity.validate()?;
    Ok(Mutation::Update {
        kind: T::KIND,
        key: assigned_key(entity)?,
        body: encode(entity)?,
    })
}

pub(crate) fn delete_of<T: Entity>(entity: &T) -> RepoResult<Mutation> {
    Ok(Mutation::Delete {
        kind: T::KIND,
        key: assigned_key(entity)?,
    })
}
