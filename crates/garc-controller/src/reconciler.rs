//! The reconcile pass.

use std::sync::Arc;

use garc_auth::{AppTokenClient, TokenIssuer};
use garc_core::Runner;
use garc_core::naming;
use garc_storage::{EventSink, ObjectEvent, ResourceStore};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Resource;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::apply::{ApplyOutcome, Applier};
use crate::builder::{EffectiveRunner, build_credential, build_deployment, build_workspace};
use crate::config::ControllerConfig;
use crate::credentials::{TokenCache, parse_expiry, renewal_delay};
use crate::error::{ReconcileError, Result};
use crate::gc;

/// Result of one reconcile pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    /// Shortest delay any step asked for. Negative means "now".
    pub requeue_after: Option<Duration>,
    /// Time left until the managed credential is due for renewal, also when this pass
    /// left it untouched.
    pub next_renewal: Option<Duration>,
}

impl ReconcileResult {
    fn request_requeue(&mut self, delay: Duration) {
        self.requeue_after = Some(self.requeue_after.map_or(delay, |current| current.min(delay)));
    }

    fn record(&mut self, name: String, outcome: ApplyOutcome, conflict_delay: Duration) {
        match outcome {
            ApplyOutcome::Created => self.created.push(name),
            ApplyOutcome::Updated => self.updated.push(name),
            ApplyOutcome::Conflict => self.request_requeue(conflict_delay),
            ApplyOutcome::Unchanged => {}
        }
    }

    /// When the Runner has to be looked at again even without a change notification.
    pub fn next_wakeup(&self) -> Option<Duration> {
        match (self.requeue_after, self.next_renewal) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Converges Runners into their children.
///
/// Passes are serialized: the token cache lock is held for a whole pass.
pub struct Reconciler<S, E> {
    store: S,
    events: E,
    config: ControllerConfig,
    issuer: Option<Arc<dyn TokenIssuer>>,
    tokens: Mutex<TokenCache>,
}

impl<S: ResourceStore, E: EventSink> Reconciler<S, E> {
    /// Creates a reconciler; a token client is built when the GitHub App is configured.
    pub fn new(store: S, events: E, config: ControllerConfig) -> Result<Self> {
        let issuer = match config.github_app.credentials() {
            Some(credentials) => {
                Some(Arc::new(AppTokenClient::new(credentials)?) as Arc<dyn TokenIssuer>)
            }
            None => None,
        };

        Ok(Self {
            store,
            events,
            config,
            issuer,
            tokens: Mutex::new(TokenCache::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Runs one pass for Runner `namespace`/`name`.
    ///
    /// A Runner that no longer exists is already converged. On failure a Warning event
    /// is recorded on the Runner and the error is returned; children applied before the
    /// failure are left as they are.
    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileResult> {
        let mut tokens = self.tokens.lock().await;

        let Some(runner) = self.store.get::<Runner>(namespace, name).await? else {
            tracing::debug!("runner not found");
            tokens.remove(namespace, name);
            return Ok(ReconcileResult::default());
        };

        let owner = runner
            .controller_owner_ref(&())
            .ok_or_else(|| ReconcileError::MissingUid {
                name: name.to_string(),
            })?;
        let applier = Applier::new(&self.store, &self.events, owner, runner.object_ref(&()));

        match self.converge(&applier, &runner, namespace, name, &mut tokens).await {
            Ok(result) => {
                if result.is_noop() {
                    tracing::debug!(requeue_after = ?result.requeue_after, "runner converged");
                } else {
                    tracing::info!(
                        created = ?result.created,
                        updated = ?result.updated,
                        deleted = ?result.deleted,
                        requeue_after = ?result.requeue_after,
                        "runner reconciled"
                    );
                }
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    kind = err.kind(),
                    category = err.store_category().map(tracing::field::display),
                    "reconcile failed"
                );
                applier
                    .notify(ObjectEvent::warning("ReconcileFailed", "Reconcile", err.to_string()))
                    .await;
                Err(err)
            }
        }
    }

    async fn converge(
        &self,
        applier: &Applier<'_, S, E>,
        runner: &Runner,
        namespace: &str,
        name: &str,
        tokens: &mut TokenCache,
    ) -> Result<ReconcileResult> {
        let conflict_delay = self.config.conflict_requeue();
        let mut result = ReconcileResult {
            deleted: gc::collect_orphans(applier, namespace, name).await?,
            ..Default::default()
        };

        let issues_tokens =
            self.issuer.is_some() && EffectiveRunner::issues_tokens(runner, &self.config);
        let effective = EffectiveRunner::resolve(runner, namespace, name, &self.config, issues_tokens);

        if issues_tokens {
            self.converge_credential(applier, &effective, tokens, &mut result)
                .await?;
        }

        let workspace_name = naming::workspace_name(name);
        let observed = self.store.get::<ConfigMap>(namespace, &workspace_name).await?;
        let outcome = applier
            .apply_config_map(observed, build_workspace(&effective, &self.config))
            .await?;
        result.record(workspace_name, outcome, conflict_delay);

        let workload_name = naming::workload_name(name);
        let observed = self.store.get::<Deployment>(namespace, &workload_name).await?;
        let outcome = applier
            .apply_deployment(observed, build_deployment(&effective, &self.config))
            .await?;
        result.record(workload_name, outcome, conflict_delay);

        Ok(result)
    }

    /// Creates the credential, or refreshes it when its content drifted or the token is
    /// due for renewal.
    async fn converge_credential(
        &self,
        applier: &Applier<'_, S, E>,
        effective: &EffectiveRunner<'_>,
        tokens: &mut TokenCache,
        result: &mut ReconcileResult,
    ) -> Result<()> {
        let Some(issuer) = &self.issuer else {
            return Ok(());
        };
        let (namespace, name) = (effective.namespace.as_str(), effective.name.as_str());
        let margin = self.config.renewal_margin();
        let secret_name = naming::credential_name(name);

        let observed = self.store.get::<Secret>(namespace, &secret_name).await?;
        let cached = tokens
            .fresh(namespace, name, OffsetDateTime::now_utc(), margin)
            .cloned();
        let token = match cached {
            Some(token) if observed.is_some() => token,
            _ => {
                let token = issuer.issue(effective.runner.spec.repository_name()).await?;
                let expires_at = parse_expiry(&token.expires_at)?;
                tokens.insert(namespace, name, token.clone(), expires_at);
                token
            }
        };
        let expires_at = parse_expiry(&token.expires_at)?;

        let outcome = applier
            .apply_secret(observed, build_credential(effective, &token))
            .await?;
        let delay = renewal_delay(expires_at, OffsetDateTime::now_utc(), margin);
        if outcome.changed() {
            result.request_requeue(delay);
        }
        result.record(secret_name, outcome, self.config.conflict_requeue());
        result.next_renewal = Some(delay);
        Ok(())
    }
}
