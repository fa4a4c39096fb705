use std::collections::BTreeMap;

use garc_core::naming::{self, APP_LABEL, DOCKERFILE_KEY, IMAGE_ANNOTATION};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, ContainerPort, EnvFromSource, EnvVar,
    EnvVarSource, ObjectFieldSelector, PodAffinityTerm, PodAntiAffinity, PodSecurityContext,
    PodSpec, PodTemplateSpec, ResourceRequirements, SeccompProfile, SecretKeySelector,
    SecurityContext, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{EffectiveRunner, non_empty};
use crate::config::ControllerConfig;

pub const BUILDER_CONTAINER: &str = "kaniko";
pub const RUNNER_CONTAINER: &str = "runner";
pub const EXPORTER_CONTAINER: &str = "exporter";
pub const WORKSPACE_VOLUME: &str = "workspace";
pub const METRICS_PORT: i32 = 9090;
pub const RUNNER_UID: i64 = 60000;

// Values the API server would fill in; set explicitly so the observed pod template
// compares equal to the desired one.
const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const TERMINATION_MESSAGE_POLICY: &str = "File";
const PULL_IF_NOT_PRESENT: &str = "IfNotPresent";
const PULL_ALWAYS: &str = "Always";
const RESTART_ALWAYS: &str = "Always";
const DNS_CLUSTER_FIRST: &str = "ClusterFirst";
const DEFAULT_SCHEDULER: &str = "default-scheduler";
const SECCOMP_RUNTIME_DEFAULT: &str = "RuntimeDefault";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
const CONFIG_MAP_DEFAULT_MODE: i32 = 0o644;

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
const ANTI_AFFINITY_WEIGHT: i32 = 100;

/// Builds the runner Deployment: an image build init container, the runner and,
/// when metrics are enabled, the exporter sidecar.
pub fn build_deployment(effective: &EffectiveRunner<'_>, config: &ControllerConfig) -> Deployment {
    let spec = &effective.runner.spec;
    let app = naming::workload_name(&effective.name);
    let selector = LabelSelector {
        match_labels: Some(BTreeMap::from([(APP_LABEL.to_string(), app.clone())])),
        ..Default::default()
    };

    let mut labels = BTreeMap::from([(APP_LABEL.to_string(), app.clone())]);
    labels.extend(spec.template.metadata.labels.clone());
    let mut annotations = BTreeMap::from([(IMAGE_ANNOTATION.to_string(), spec.image.clone())]);
    annotations.extend(spec.template.metadata.annotations.clone());

    let mut containers = vec![runner_container(effective, config)];
    if config.runner.enable_metrics {
        containers.push(exporter_container(effective, config));
    }

    let mut volumes = vec![Volume {
        name: WORKSPACE_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: naming::workspace_name(&effective.name),
            default_mode: Some(CONFIG_MAP_DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }];
    volumes.extend(spec.template.spec.volumes.iter().cloned());

    Deployment {
        metadata: ObjectMeta {
            name: Some(app),
            namespace: Some(effective.namespace.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: selector.clone(),
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::String("25%".to_string())),
                    max_unavailable: Some(IntOrString::Int(1)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: Some(Affinity {
                        pod_anti_affinity: Some(PodAntiAffinity {
                            preferred_during_scheduling_ignored_during_execution: Some(vec![
                                WeightedPodAffinityTerm {
                                    weight: ANTI_AFFINITY_WEIGHT,
                                    pod_affinity_term: PodAffinityTerm {
                                        label_selector: Some(selector),
                                        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                                        ..Default::default()
                                    },
                                },
                            ]),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    init_containers: Some(vec![builder_container(effective, config)]),
                    containers,
                    volumes: Some(volumes),
                    restart_policy: Some(RESTART_ALWAYS.to_string()),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    dns_policy: Some(DNS_CLUSTER_FIRST.to_string()),
                    security_context: Some(PodSecurityContext {
                        seccomp_profile: Some(runtime_default_seccomp()),
                        ..Default::default()
                    }),
                    scheduler_name: Some(DEFAULT_SCHEDULER.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn builder_container(effective: &EffectiveRunner<'_>, config: &ControllerConfig) -> Container {
    let overrides = &effective.runner.spec.builder_container_spec;

    let mut volume_mounts = vec![VolumeMount {
        name: WORKSPACE_VOLUME.to_string(),
        mount_path: format!("/workspace/{DOCKERFILE_KEY}"),
        sub_path: Some(DOCKERFILE_KEY.to_string()),
        read_only: Some(true),
        ..Default::default()
    }];
    volume_mounts.extend(overrides.volume_mounts.iter().cloned());

    Container {
        name: BUILDER_CONTAINER.to_string(),
        image: Some(config.images.kaniko.clone()),
        image_pull_policy: Some(PULL_IF_NOT_PRESENT.to_string()),
        args: Some(vec![
            format!("--dockerfile={DOCKERFILE_KEY}"),
            "--context=dir:///workspace".to_string(),
            "--cache=true".to_string(),
            "--compressed-caching=false".to_string(),
            format!(
                "--destination={}/{}",
                config.registry.push_host, effective.repository_id
            ),
        ]),
        env: non_empty(overrides.env.clone()),
        env_from: non_empty(overrides.env_from.clone()),
        volume_mounts: Some(volume_mounts),
        resources: Some(effective.builder_resources.clone()),
        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
        termination_message_policy: Some(TERMINATION_MESSAGE_POLICY.to_string()),
        ..Default::default()
    }
}

fn runner_container(effective: &EffectiveRunner<'_>, config: &ControllerConfig) -> Container {
    let spec = &effective.runner.spec;
    let overrides = &spec.runner_container_spec;

    let mut args = vec![
        "--without-install".to_string(),
        "--repository=$(REPOSITORY)".to_string(),
        "--hostname=$(HOSTNAME)".to_string(),
    ];
    let mut env = overrides.env.clone();
    env.push(repository_env(&spec.repository));
    env.push(EnvVar {
        name: "HOSTNAME".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: "metadata.name".to_string(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    });
    let mut env_from = overrides.env_from.clone();

    if let Some(token_ref) = &effective.token_ref {
        args.push("--token=$(TOKEN)".to_string());
        env.push(token_env(token_ref));
    }

    if let Some(app_secret) = &spec.app_secret_ref {
        args.extend([
            "--github-app-id=$(github_app_id)".to_string(),
            "--github-app-installation-id=$(github_app_installation_id)".to_string(),
            "--github-app-private-key=$(github_app_private_key)".to_string(),
        ]);
        env_from.push(EnvFromSource {
            secret_ref: Some(app_secret.clone()),
            ..Default::default()
        });
    }

    if config.runner.disable_update {
        args.push("--disableupdate".to_string());
    }

    Container {
        name: RUNNER_CONTAINER.to_string(),
        image: Some(format!(
            "{}/{}",
            config.registry.pull_host, effective.repository_id
        )),
        image_pull_policy: Some(PULL_ALWAYS.to_string()),
        args: Some(args),
        env: Some(env),
        env_from: non_empty(env_from),
        resources: Some(overrides.resources.clone()),
        volume_mounts: non_empty(overrides.volume_mounts.clone()),
        security_context: Some(SecurityContext {
            privileged: Some(false),
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(false),
            run_as_user: Some(RUNNER_UID),
            run_as_non_root: Some(true),
            seccomp_profile: Some(runtime_default_seccomp()),
            ..Default::default()
        }),
        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
        termination_message_policy: Some(TERMINATION_MESSAGE_POLICY.to_string()),
        ..Default::default()
    }
}

fn exporter_container(effective: &EffectiveRunner<'_>, config: &ControllerConfig) -> Container {
    let mut args = vec![
        "server".to_string(),
        "--api-address=0.0.0.0:8000".to_string(),
        format!("--monitor-address=0.0.0.0:{METRICS_PORT}"),
        "--repository=$(REPOSITORY)".to_string(),
    ];
    let mut env = vec![repository_env(&effective.runner.spec.repository)];
    if let Some(token_ref) = &effective.token_ref {
        args.push("--token=$(TOKEN)".to_string());
        env.push(token_env(token_ref));
    }

    Container {
        name: EXPORTER_CONTAINER.to_string(),
        image: Some(config.images.exporter.clone()),
        image_pull_policy: Some(PULL_ALWAYS.to_string()),
        args: Some(args),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            container_port: METRICS_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements::default()),
        termination_message_path: Some(TERMINATION_MESSAGE_PATH.to_string()),
        termination_message_policy: Some(TERMINATION_MESSAGE_POLICY.to_string()),
        ..Default::default()
    }
}

fn repository_env(repository: &str) -> EnvVar {
    EnvVar {
        name: "REPOSITORY".to_string(),
        value: Some(repository.to_string()),
        ..Default::default()
    }
}

fn token_env(token_ref: &SecretKeySelector) -> EnvVar {
    EnvVar {
        name: "TOKEN".to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(token_ref.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn runtime_default_seccomp() -> SeccompProfile {
    SeccompProfile {
        type_: SECCOMP_RUNTIME_DEFAULT.to_string(),
        ..Default::default()
    }
}
