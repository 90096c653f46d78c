//! Result decoding.
//!
//! Raw rows, whether read from a live result set or a cache region, are
//! decoded by a [`RowReader`] according to the [`ResultSetMapping`] built at
//! translation time, then shaped by a [`RowTransformer`].

mod mapping;
mod reader;
mod row;
mod transformer;

pub use mapping::{
    AttributeReader, EntityDescriptor, FetchDescriptor, MappedResult, ResultDescriptor,
    ResultSetMapping,
};
pub use reader::{FetchMerger, RowReader};
pub use row::{
    merge_row, rows_share_identity, value_keys, EntityInstance, Fetched, IdentityKey, ResultValue,
    ValueKey,
};
pub use transformer::{
    AliasToMap, DistinctRootEntity, FnRowTransformer, RootEntity, RowTransformer, SingularReturn,
    TupleTransformer,
};
