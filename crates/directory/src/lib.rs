pub mod error;
pub mod fixture;
pub mod ids;
pub mod types;

use std::future::Future;
use std::pin::Pin;

pub use error::{ErrorModel, LookupError, LookupResult};
pub use fixture::{DirectoryFixture, FixtureDirectory};
pub use ids::{ConversationToken, UserId};
pub use types::{ContactsQuery, Participant, ParticipantSource, SessionUser};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Directory search backing the contact picker.
///
/// Implementations perform the actual network or query work and must stay cancel-safe:
/// the caller may drop the returned future at any await point.
pub trait ContactsLookup: Send + Sync {
    fn lookup<'a>(
        &'a self,
        query: &'a ContactsQuery,
    ) -> BoxFuture<'a, LookupResult<Vec<Participant>>>;
}
