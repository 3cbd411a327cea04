//! Session credentials and single-flight token renewal.
//!
//! | Type | Role |
//! |------|------|
//! | [`AuthCoordinator`] | Owns the live [`CredentialPair`], renews it through `POST /auth/refresh` |
//! | [`CredentialStore`] | Persistence seam ([`MemoryCredentialStore`], [`FileCredentialStore`]) |
//! | [`SessionEvent`] | Broadcast when the session starts, renews, expires or ends |

mod coordinator;
mod store;

pub use coordinator::{AuthCoordinator, SessionEvent, REFRESH_PATH};
pub use store::{
    CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};
