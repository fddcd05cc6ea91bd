//! Users subsystem — user-record sync behind `users/*` bus methods.
//!
//! The store does blocking SQLite I/O, so every request hops through
//! `spawn_blocking`; the supervisor loop is never blocked.

pub mod store;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::supervisor::bus::{BusError, BusPayload, BusResult, ERR_INTERNAL, ERR_METHOD_NOT_FOUND};
use crate::supervisor::dispatch::BusHandler;

use store::{NewUser, UserStore};

pub struct UsersSubsystem {
    store: Arc<UserStore>,
}

impl UsersSubsystem {
    pub fn new(db_path: &Path) -> Result<Self, AppError> {
        Ok(Self { store: Arc::new(UserStore::open(db_path)?) })
    }
}

impl BusHandler for UsersSubsystem {
    fn prefix(&self) -> &str {
        "users"
    }

    fn handle_request(&self, method: &str, payload: BusPayload, reply_tx: oneshot::Sender<BusResult>) {
        match payload {
            BusPayload::UserSync { name, email, identity_id, image } if method == "users/sync" => {
                let store = self.store.clone();
                debug!(%identity_id, "dispatching user sync");
                tokio::spawn(async move {
                    let user = NewUser { name, email, identity_id, image };
                    let result = tokio::task::spawn_blocking(move || store.sync(&user)).await;
                    let result = match result {
                        Ok(Ok(outcome)) => serde_json::to_string(&outcome)
                            .map(|data| BusPayload::JsonResponse { data })
                            .map_err(|e| BusError::new(ERR_INTERNAL, e.to_string())),
                        Ok(Err(e)) => {
                            warn!(error = %e, "user sync failed");
                            Err(BusError::new(ERR_INTERNAL, e.to_string()))
                        }
                        Err(e) => Err(BusError::new(ERR_INTERNAL, format!("sync task panicked: {e}"))),
                    };
                    let _ = reply_tx.send(result);
                });
            }
            _ => {
                let _ = reply_tx.send(Err(BusError::new(
                    ERR_METHOD_NOT_FOUND,
                    format!("unsupported users method: {method}"),
                )));
            }
        }
    }
}
