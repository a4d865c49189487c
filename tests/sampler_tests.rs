// Sampler tests against a scripted container runtime

mod common;

use common::{FakeContainer, FakeRuntime};
use dockwatch::error::MetricsError;
use dockwatch::models::ContainerStatus;
use dockwatch::sampler::Sampler;
use std::sync::Arc;

fn sampler(containers: Vec<FakeContainer>) -> Sampler {
    Sampler::new(Arc::new(FakeRuntime::with(containers)))
}

#[tokio::test]
async fn failing_container_is_excluded_and_rest_proceed() {
    let s = sampler(vec![
        FakeContainer::running("web", "", 100, 1_000),
        FakeContainer::broken("flaky"),
        FakeContainer::running("db", "999:999", 250, 2_000),
    ]);
    let fleet = s.sample().await.unwrap();
    let names: Vec<&str> = fleet.containers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["db", "web"]);
    assert_eq!(fleet.security.len(), 2);
}

#[tokio::test]
async fn failed_listing_fails_the_sample() {
    let s = Sampler::new(Arc::new(FakeRuntime::failing()));
    let err = s.sample().await.unwrap_err();
    assert!(matches!(err, MetricsError::SourceUnavailable(_)));
}

#[tokio::test]
async fn stats_failure_on_running_container_excludes_it() {
    let mut no_stats = FakeContainer::running("nostats", "", 0, 0);
    no_stats.stats = None;
    let s = sampler(vec![no_stats, FakeContainer::running("ok", "", 0, 0)]);
    let fleet = s.sample().await.unwrap();
    assert_eq!(fleet.containers.len(), 1);
    assert_eq!(fleet.containers[0].name, "ok");
    assert!(fleet.metric_samples(0).iter().all(|s| s.container_name == "ok"));

    // The audit comes from inspect alone, so the root container stays visible.
    assert_eq!(fleet.security.len(), 2);
    let audit = fleet
        .security
        .iter()
        .find(|a| a.container_name == "nostats")
        .unwrap();
    assert!(audit.is_root);
}

#[tokio::test]
async fn live_record_fields() {
    let s = sampler(vec![FakeContainer::running("web", "", 100, 1 << 29)]);
    let fleet = s.sample().await.unwrap();
    let web = &fleet.containers[0];
    assert_eq!(web.status, ContainerStatus::Running);
    assert_eq!(web.container_id.len(), 12);
    assert_eq!(web.cpu, 10.0);
    assert_eq!(web.memory_usage, 1 << 29);
    assert_eq!(web.memory_percent, 50.0);
    assert_eq!(web.user, "root");
    assert_eq!(web.uid, Some(0));
    assert!(web.uptime.is_some());
}

#[tokio::test]
async fn stopped_container_is_listed_without_stats() {
    let s = sampler(vec![FakeContainer::stopped("old")]);
    let fleet = s.sample().await.unwrap();
    let old = &fleet.containers[0];
    assert_eq!(old.status, ContainerStatus::Stopped);
    assert_eq!(old.cpu, 0.0);
    assert_eq!(old.memory_usage, 0);
    assert!(old.uptime.is_none());
}

#[tokio::test]
async fn security_classification() {
    let s = sampler(vec![
        FakeContainer::running("empty", "", 0, 0),
        FakeContainer::running("rootname", "root", 0, 0),
        FakeContainer::running("zero", "0", 0, 0),
        FakeContainer::running("rootpair", "0:0", 0, 0),
        FakeContainer::running("numeric", "101", 0, 0),
        FakeContainer::running("named", "nginx", 0, 0),
    ]);
    let fleet = s.sample().await.unwrap();
    let is_root = |name: &str| {
        fleet
            .security
            .iter()
            .find(|a| a.container_name == name)
            .map(|a| a.is_root)
    };
    assert_eq!(is_root("empty"), Some(true));
    assert_eq!(is_root("rootname"), Some(true));
    assert_eq!(is_root("zero"), Some(true));
    assert_eq!(is_root("rootpair"), Some(true));
    assert_eq!(is_root("numeric"), Some(false));
    assert_eq!(is_root("named"), Some(false));

    let numeric = fleet
        .security
        .iter()
        .find(|a| a.container_name == "numeric")
        .unwrap();
    assert_eq!(numeric.uid, 101);
    assert_eq!(numeric.user, "101");
}

#[tokio::test]
async fn only_running_containers_become_samples() {
    let s = sampler(vec![
        FakeContainer::running("web", "", 100, 1_000),
        FakeContainer::unhealthy("sick", 200, 2_000),
        FakeContainer::stopped("old"),
    ]);
    let fleet = s.sample().await.unwrap();
    assert_eq!(fleet.containers.len(), 3);

    let samples = fleet.metric_samples(1_700_000_000);
    let names: Vec<&str> = samples.iter().map(|s| s.container_name.as_str()).collect();
    assert_eq!(names, vec!["sick", "web"]);
    assert!(samples.iter().all(|s| s.timestamp == 1_700_000_000));
    assert_eq!(samples[0].cpu_percent, 20.0);
    assert_eq!(samples[0].mem_usage, 2_000);
    let sick = fleet.containers.iter().find(|c| c.name == "sick").unwrap();
    assert_eq!(sick.status, ContainerStatus::Unhealthy);
}
