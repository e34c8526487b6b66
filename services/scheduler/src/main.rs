//! flotilla scheduler service
//!
//! Drives the jobs observed on a pool of hosts toward the formations
//! declared in the controller. Transport clients for a real controller and
//! cluster are wired by the deployment; with `FLOTILLA_DEV_CLUSTER=1` the
//! scheduler runs against an in-memory cluster seeded with a demo app, so
//! the full loop can be exercised locally.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flotilla_id::{AppId, ArtifactId, HostId, ReleaseId};
use flotilla_scheduler::testing::{
    FakeCluster, FakeControllerClient, FakeHostClient, FakeVolumeProvisioner,
};
use flotilla_scheduler::{
    App, Artifact, Config, ControllerClient, DeclaredFormation, ProcessSpec, Release, Scheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting flotilla scheduler");

    let config = Config::from_env()?;
    info!(
        job_sync_interval_secs = config.scheduler.job_sync_interval.as_secs(),
        formation_sync_interval_secs = config.scheduler.formation_sync_interval.as_secs(),
        leader = config.scheduler.leader,
        "Configuration loaded"
    );

    if !config.dev_cluster {
        // TODO: wire the controller/cluster transport clients once the
        // deployment settles on one; until then only dev-cluster mode runs.
        anyhow::bail!(
            "no cluster transport configured; set FLOTILLA_DEV_CLUSTER=1 to run against the in-memory dev cluster"
        );
    }

    info!("Running against the in-memory dev cluster");

    let controller = Arc::new(FakeControllerClient::new());
    seed_demo_app(controller.as_ref()).await?;

    let cluster = Arc::new(FakeCluster::new());
    cluster.add_host(Arc::new(FakeHostClient::new(HostId::new("dev-host-1")?)));

    let volumes = Arc::new(FakeVolumeProvisioner::new());

    let (scheduler, handle) = Scheduler::new(controller, cluster, volumes, config.scheduler);
    let loop_task = tokio::spawn(scheduler.run());

    // The dev cluster has no election to win.
    handle.change_leader(true).await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.stop();
    loop_task.await?;

    Ok(())
}

/// Seeds one app with a single web process so the dev cluster has something
/// to converge on.
async fn seed_demo_app(controller: &FakeControllerClient) -> Result<()> {
    let app = App {
        id: AppId::new(),
        name: "demo".to_string(),
    };
    let artifact = Artifact {
        id: ArtifactId::new(),
        uri: "docker://registry.local/demo:latest".to_string(),
    };
    let release = Release {
        id: ReleaseId::new(),
        artifact_id: artifact.id,
        env: HashMap::new(),
        processes: HashMap::from([(
            "web".to_string(),
            ProcessSpec {
                cmd: vec!["./web".to_string()],
                env: HashMap::new(),
                data: false,
            },
        )]),
    };
    let formation = DeclaredFormation {
        app_id: app.id,
        release_id: release.id,
        processes: [("web".to_string(), 1)].into_iter().collect(),
    };

    info!(app.id = %app.id, release.id = %release.id, "Seeding demo app");
    controller.create_app(app).await?;
    controller.create_artifact(artifact).await?;
    controller.create_release(release).await?;
    controller.put_formation(formation).await?;
    Ok(())
}
