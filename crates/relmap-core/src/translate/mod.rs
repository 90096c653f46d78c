//! Query translation.
//!
//! Criteria queries and id-keyed loads are translated into an SQL AST, a
//! result set mapping and the parameter values known up front. Lock requests
//! are planned here: either embedded in the select or deferred to follow-on
//! lock statements.

mod builder;
mod criteria;
mod id_select;
mod influencers;
mod lock;

pub use criteria::{CriteriaTranslator, TranslatedQuery};
pub use id_select::LOAD_ID_PARAMETER;
pub use influencers::{EntityGraph, InternalFetchProfile, LoadQueryInfluencers};
pub use lock::{
    plan_locking, requires_row_lock, FollowOnLock, FollowOnTarget, LockStrategy, LockableAlias,
};
