//! Wiring of the [`Reconciler`] into a kube-rs `Controller`.
//!
//! The controller watches Runners and the Secrets, ConfigMaps and Deployments they
//! control, runs at most one pass at a time and requeues according to the pass result.
//! Changes that leave `metadata.generation` untouched do not trigger a pass.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use garc_core::Runner;
use garc_db_kube::{KubeEventRecorder, KubeStore};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::{WatchStreamExt, predicates, reflector, watcher};
use kube::{Api, Client, Resource, ResourceExt};

use crate::config::ControllerConfig;
use crate::error::{ReconcileError, Result};
use crate::reconciler::{ReconcileResult, Reconciler};

/// Name the controller reports events under.
pub const CONTROLLER_NAME: &str = "github-actions-runner-controller";

struct Context {
    reconciler: Reconciler<KubeStore, KubeEventRecorder>,
    error_requeue: Duration,
}

/// Runs the controller until a termination signal arrives.
pub async fn run(client: Client, config: ControllerConfig) -> Result<()> {
    let error_requeue = config.error_requeue();
    let reconciler = Reconciler::new(
        KubeStore::new(client.clone()),
        KubeEventRecorder::new(client.clone(), CONTROLLER_NAME),
        config,
    )?;
    tracing::info!(
        dynamic_tokens = reconciler.config().github_app.is_configured(),
        metrics = reconciler.config().runner.enable_metrics,
        "starting runner controller"
    );
    let context = Arc::new(Context {
        reconciler,
        error_requeue,
    });

    // Runners and Deployments only trigger on spec changes; status-only updates are
    // dropped. Secrets and ConfigMaps carry no generation, so every change passes.
    let (reader, writer) = reflector::store();
    let runners = watcher(Api::<Runner>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects();
    let deployments = watcher(Api::<Deployment>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .touched_objects();

    Controller::for_stream(spec_changes(runners), reader)
        .owns(Api::<Secret>::all(client.clone()), watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client), watcher::Config::default())
        .owns_stream(spec_changes(deployments))
        .with_config(controller::Config::default().concurrency(1))
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|outcome| async move {
            match outcome {
                Ok((object, action)) => {
                    tracing::debug!(runner = %object.name, ?action, "pass finished");
                }
                Err(e) => tracing::warn!(error = %e, "controller error"),
            }
        })
        .await;

    tracing::info!("runner controller stopped");
    Ok(())
}

/// Drops notifications that leave `metadata.generation` unchanged. Objects without a
/// generation always pass.
fn spec_changes<K>(
    stream: impl Stream<Item = std::result::Result<K, watcher::Error>>,
) -> impl Stream<Item = std::result::Result<K, watcher::Error>>
where
    K: Resource<DynamicType = ()> + 'static,
{
    stream.predicate_filter(predicates::generation)
}

async fn reconcile(runner: Arc<Runner>, context: Arc<Context>) -> Result<Action> {
    let namespace = runner.namespace().unwrap_or_default();
    let result = context
        .reconciler
        .reconcile(&namespace, &runner.name_any())
        .await?;
    Ok(requeue_delay(&result).map_or_else(Action::await_change, Action::requeue))
}

fn error_policy(runner: Arc<Runner>, error: &ReconcileError, context: Arc<Context>) -> Action {
    tracing::warn!(
        runner = %runner.name_any(),
        error = %error,
        retry_in = ?context.error_requeue,
        "scheduling retry"
    );
    Action::requeue(context.error_requeue)
}

/// Requeue delay for a pass result; overdue delays become an immediate requeue.
pub fn requeue_delay(result: &ReconcileResult) -> Option<Duration> {
    result
        .next_wakeup()
        .map(|delay| Duration::try_from(delay).unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garc_core::RunnerSpec;

    fn runner(generation: i64, resource_version: &str) -> Runner {
        let mut runner = Runner::new("build", RunnerSpec::new("org/repo", "ubuntu:22.04"));
        runner.metadata.namespace = Some("ci".into());
        runner.metadata.generation = Some(generation);
        runner.metadata.resource_version = Some(resource_version.into());
        runner
    }

    #[tokio::test]
    async fn test_only_generation_changes_trigger() {
        let notifications = futures_util::stream::iter(vec![
            Ok(runner(1, "10")),
            Ok(runner(1, "11")),
            Ok(runner(2, "12")),
            Ok(runner(2, "13")),
        ]);
        let passed: Vec<_> = spec_changes(notifications)
            .map(|r| r.map(|runner| runner.metadata.resource_version))
            .collect()
            .await;
        let versions: Vec<_> = passed.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert_eq!(versions, vec!["10", "12"]);
    }

    #[tokio::test]
    async fn test_objects_without_generation_always_trigger() {
        let config_map = |version: &str| ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some("build-workspace".into()),
                namespace: Some("ci".into()),
                resource_version: Some(version.into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let notifications =
            futures_util::stream::iter(vec![Ok(config_map("1")), Ok(config_map("2"))]);
        let passed: Vec<_> = spec_changes(notifications).collect().await;
        assert_eq!(passed.len(), 2);
    }

    #[test]
    fn test_requeue_delay() {
        assert_eq!(requeue_delay(&ReconcileResult::default()), None);

        let result = ReconcileResult {
            requeue_after: Some(time::Duration::seconds(1)),
            next_renewal: Some(time::Duration::minutes(59)),
            ..Default::default()
        };
        assert_eq!(requeue_delay(&result), Some(Duration::from_secs(1)));

        let result = ReconcileResult {
            next_renewal: Some(time::Duration::minutes(59)),
            ..Default::default()
        };
        assert_eq!(requeue_delay(&result), Some(Duration::from_secs(59 * 60)));

        let result = ReconcileResult {
            requeue_after: Some(time::Duration::seconds(-30)),
            ..Default::default()
        };
        assert_eq!(requeue_delay(&result), Some(Duration::ZERO));
    }
}
