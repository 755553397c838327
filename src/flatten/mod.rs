// ============================================================================
// End-Point Flattening
// ============================================================================
//
// Persists collection end-point state across process boundaries as a plain
// record produced and consumed by free functions. The record references
// objects and strategies by handle (identifier / name); handle fields come
// first so a reader can resolve them before the value fields that reference
// them. Field order round-trips exactly.
//
// Wire format: MessagePack for compact binary serialization, with a JSON
// projection for diagnostics.
//
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::collection::{ChangeCachingCollectionData, DomainObjectCollectionData};
use crate::context::MappingConfig;
use crate::core::{MappingError, ObjectId, RelationDefinition, RelationEndPointId, Result};
use crate::endpoint::{
    CollectionEndPoint, CollectionEndPointDataKeeper, CompleteLoadState, IncompleteLoadState,
    LoadState, RealObjectEndPoint, SharedRealObjectEndPoint,
};

/// Flattened form of one opposite end-point handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedRealObjectEndPoint {
    pub id: RelationEndPointId,
    pub is_synchronized: bool,
}

/// Flattened form of one collection end point
///
/// Field order is the serialization order: handles (end-point identifier,
/// opposite property, strategy name) before the value fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedCollectionEndPoint {
    pub id: RelationEndPointId,
    pub opposite_property_name: String,
    pub change_detection: String,
    pub is_data_complete: bool,
    pub has_been_touched: bool,
    pub current_items: Vec<ObjectId>,
    pub original_items: Vec<ObjectId>,
    pub original_opposite_end_points: Vec<FlattenedRealObjectEndPoint>,
    pub original_items_without_end_points: Vec<ObjectId>,
    pub current_opposite_end_points: Vec<FlattenedRealObjectEndPoint>,
}

fn flatten_end_point_map(
    end_points: &HashMap<ObjectId, SharedRealObjectEndPoint>,
) -> Vec<FlattenedRealObjectEndPoint> {
    let mut flattened: Vec<_> = end_points
        .values()
        .map(|end_point| {
            let end_point = end_point.borrow();
            FlattenedRealObjectEndPoint {
                id: end_point.id().clone(),
                is_synchronized: end_point.is_synchronized(),
            }
        })
        .collect();
    // deterministic order so the flattened form round-trips exactly
    flattened.sort_by(|a, b| a.id.owner().cmp(&b.id.owner()));
    flattened
}

/// Produce the flattened record for an end point
pub fn flatten(end_point: &CollectionEndPoint) -> FlattenedCollectionEndPoint {
    let keeper = end_point.state().data_keeper();
    let mut without: Vec<_> = keeper
        .original_items_without_end_points()
        .iter()
        .copied()
        .collect();
    without.sort();

    FlattenedCollectionEndPoint {
        id: end_point.id().clone(),
        opposite_property_name: end_point.relation().opposite_property_name().to_string(),
        change_detection: keeper.change_detection().name().to_string(),
        is_data_complete: end_point.is_data_complete(),
        has_been_touched: end_point.has_been_touched(),
        current_items: keeper.current_data().iter().collect(),
        original_items: keeper.original_data().iter().collect(),
        original_opposite_end_points: flatten_end_point_map(keeper.original_opposite_end_points()),
        original_items_without_end_points: without,
        current_opposite_end_points: flatten_end_point_map(keeper.current_opposite_end_points()),
    }
}

/// Reconstruct an end point from its flattened record
///
/// The current opposite end-point list is rebuilt into the identifier-keyed
/// map; a handle appearing in both the current and original lists resolves to
/// one shared instance, with the current list taking precedence.
///
/// # Errors
/// Fails if the strategy handle is unknown or the record violates the
/// keeper's accounting invariant
pub fn unflatten(record: &FlattenedCollectionEndPoint) -> Result<CollectionEndPoint> {
    let change_detection = MappingConfig::strategy_by_name(&record.change_detection)
        .ok_or_else(|| {
            MappingError::Flatten(format!(
                "unknown change-detection strategy '{}'",
                record.change_detection
            ))
        })?;

    // resolve handles first: one shared instance per related object
    let mut handles: HashMap<ObjectId, SharedRealObjectEndPoint> = HashMap::new();
    for flattened in record
        .current_opposite_end_points
        .iter()
        .chain(record.original_opposite_end_points.iter())
    {
        handles.entry(flattened.id.owner()).or_insert_with(|| {
            let mut end_point =
                RealObjectEndPoint::new(flattened.id.owner(), flattened.id.property_name());
            if flattened.is_synchronized {
                end_point.mark_synchronized();
            }
            Rc::new(std::cell::RefCell::new(end_point))
        });
    }

    let resolve = |list: &[FlattenedRealObjectEndPoint]| -> Result<HashMap<ObjectId, SharedRealObjectEndPoint>> {
        list.iter()
            .map(|flattened| {
                let owner = flattened.id.owner();
                handles
                    .get(&owner)
                    .map(|end_point| (owner, Rc::clone(end_point)))
                    .ok_or_else(|| {
                        MappingError::Flatten(format!("unresolved end-point handle '{}'", flattened.id))
                    })
            })
            .collect()
    };
    let original_end_points = resolve(&record.original_opposite_end_points)?;
    let current_end_points = resolve(&record.current_opposite_end_points)?;

    let current =
        DomainObjectCollectionData::from_items(&record.current_items).map_err(flatten_error)?;
    let original =
        DomainObjectCollectionData::from_items(&record.original_items).map_err(flatten_error)?;
    let without: HashSet<_> = record
        .original_items_without_end_points
        .iter()
        .copied()
        .collect();

    let keeper = CollectionEndPointDataKeeper::restore(
        record.id.clone(),
        change_detection,
        ChangeCachingCollectionData::from_views(current, original),
        original_end_points,
        current_end_points,
        without,
    )
    .map_err(flatten_error)?;

    let state = if record.is_data_complete {
        LoadState::Complete(CompleteLoadState::new(keeper))
    } else {
        LoadState::Incomplete(IncompleteLoadState::new(keeper))
    };
    let relation = RelationDefinition::new(
        record.id.property_name(),
        record.opposite_property_name.clone(),
    );
    Ok(CollectionEndPoint::from_parts(
        record.id.clone(),
        relation,
        state,
        record.has_been_touched,
    ))
}

fn flatten_error(err: MappingError) -> MappingError {
    match err {
        MappingError::Flatten(_) => err,
        other => MappingError::Flatten(other.to_string()),
    }
}

/// Encode a flattened record as MessagePack bytes
pub fn to_bytes(record: &FlattenedCollectionEndPoint) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(record)?)
}

/// Decode a flattened record from MessagePack bytes
pub fn from_bytes(bytes: &[u8]) -> Result<FlattenedCollectionEndPoint> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// JSON projection of a flattened record, for diagnostics and tooling
pub fn to_json_string(record: &FlattenedCollectionEndPoint) -> Result<String> {
    serde_json::to_string_pretty(record).map_err(|err| MappingError::Flatten(err.to_string()))
}
