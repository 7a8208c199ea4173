//! Delete uploaded assets nothing references any more.
//!
//! Only the reserved namespaces are ever listed; a namespace that does not
//! exist remotely is empty. Deletions retry transient failures and never stop
//! the remaining deletions.

use serde::Serialize;

use coursesync_core::retry::{retry, RetryPolicy};
use coursesync_core::RemoteKind;

use crate::assets::ActiveSet;
use crate::remote::{AssetInfo, RemoteApi, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedAsset {
    pub namespace: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneFailure {
    pub namespace: String,
    pub asset: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub deleted: Vec<PrunedAsset>,
    pub failures: Vec<PruneFailure>,
}

fn pruned(namespace: &str, asset: &AssetInfo) -> PrunedAsset {
    PrunedAsset {
        namespace: namespace.to_string(),
        id: asset.id.to_string(),
        name: asset.name.clone(),
    }
}

pub fn prune(
    remote: &dyn RemoteApi,
    namespaces: &[&str],
    active: &ActiveSet,
    policy: RetryPolicy,
) -> PruneReport {
    let mut report = PruneReport::default();

    for &namespace in namespaces {
        let assets = match remote.list_assets(namespace) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(namespace, error = %e, "could not list assets, skipping namespace");
                report.failures.push(PruneFailure {
                    namespace: namespace.to_string(),
                    asset: String::new(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        for asset in assets.iter().filter(|a| !active.is_active(&a.id)) {
            let result = retry(policy, RemoteError::is_transient, || {
                remote.delete_object(RemoteKind::File, None, &asset.id)
            });
            match result {
                Ok(()) => {
                    tracing::info!(namespace, asset = %asset.name, id = %asset.id, "pruned unreferenced asset");
                    report.deleted.push(pruned(namespace, asset));
                }
                Err(e) => {
                    tracing::error!(namespace, asset = %asset.name, error = %e, "could not delete asset");
                    report.failures.push(PruneFailure {
                        namespace: namespace.to_string(),
                        asset: asset.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    report
}
