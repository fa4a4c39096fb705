use std::collections::BTreeMap;

use garc_core::naming::{self, DOCKERFILE_KEY};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::EffectiveRunner;
use crate::config::ControllerConfig;

/// Builds the ConfigMap holding the runner image build context.
pub fn build_workspace(effective: &EffectiveRunner<'_>, config: &ControllerConfig) -> ConfigMap {
    let dockerfile = render_dockerfile(
        &effective.runner.spec.image,
        &config.versions.binary,
        &config.versions.runner,
        &config.runner.release_base_url,
    );

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(naming::workspace_name(&effective.name)),
            namespace: Some(effective.namespace.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(DOCKERFILE_KEY.to_string(), dockerfile)])),
        ..Default::default()
    }
}

/// Renders the Dockerfile that turns `image` into a runner image.
///
/// The package install step works on apt, apt-get, dnf, yum and zypper based images and
/// fails only when none of them is present.
pub fn render_dockerfile(
    image: &str,
    binary_version: &str,
    runner_version: &str,
    release_base_url: &str,
) -> String {
    let release_base_url = release_base_url.trim_end_matches('/');
    format!(
        r#"
FROM {image}
USER root
ENV DEBIAN_FRONTEND=noninteractive
RUN (command -v apt && apt update && apt install -y ca-certificates iputils-ping tar sudo git) || \
      (command -v apt-get && apt-get update && apt-get install -y --no-install-recommends ca-certificates iputils-ping tar sudo git) || \
      (command -v dnf && dnf install -y ca-certificates iputils tar sudo git) || \
      (command -v yum && yum install -y ca-certificates iputils tar sudo git) || \
      (command -v zypper && zypper install -n ca-certificates iputils tar sudo git-core) || \
      (echo "Unknown OS version" && exit 1)

ADD {release_base_url}/v{binary_version}/runner_{binary_version}_linux_amd64 /usr/local/bin/runner
RUN chmod +x /usr/local/bin/runner

RUN echo 'runner::60000:60000::/home/runner:/bin/sh' >> /etc/passwd
RUN echo 'runner::60000:' >> /etc/group
RUN mkdir -p /home/runner && chown -R runner:runner /home/runner

RUN echo "runner:!:0:0:99999:7:::" >> /etc/shadow
RUN echo "runner ALL=(ALL) NOPASSWD: ALL" | sudo EDITOR='tee -a' visudo

WORKDIR /home/runner

RUN /usr/local/bin/runner --only-install --runner-version {runner_version}

USER 60000

ENTRYPOINT ["/usr/local/bin/runner"]
"#
    )
}
