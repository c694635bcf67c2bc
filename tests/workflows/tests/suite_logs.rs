use std::{fs, time::Duration};

use testing_framework_core::suite::SuiteLifecycle;
use testing_framework_logs::{LogVariant, LogsSuite, PodEvent};
use tests_workflows::Fixture;

const SUITE: &str = "basic";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_test_collects_diagnostics_on_every_cluster() {
    let fixture = Fixture::new(2);
    for (i, cluster) in fixture.clusters.iter().enumerate() {
        cluster.add_namespace(&format!("ns-{i}"), true);
        cluster.add_namespace("nsm-system", true);
        let pod = cluster.add_pod(&format!("ns-{i}"), "nsc-1", &["nsc"], &[]);
        cluster.set_logs(&pod.pod, "nsc", LogVariant::Current, format!("cluster {i}\n"));
    }

    let mut suite = SuiteLifecycle::new(SUITE)
        .with_component(LogsSuite::with_collector(fixture.collector.clone()));
    suite.setup_suite().await.unwrap();

    let outcome = suite
        .run_test("connectivity", || async { Err("ping failed".into()) })
        .await;
    suite.tear_down_suite().await;

    assert!(outcome.failed());
    for i in 0..2 {
        let dir = fixture.label_dir(i, "basic/connectivity");
        assert_eq!(
            fs::read_to_string(dir.join("nsc-1.log")).unwrap(),
            format!("cluster {i}\n")
        );
        assert!(dir.join(format!("describe-ns-{i}.log")).exists());
        assert!(dir.join("cluster-info.txt").exists());
        assert!(dir.join("system-0").join("describe-nsm-system.log").exists());
    }
    // One test-namespace and one system-namespace dump per cluster.
    assert_eq!(fixture.tool.dump_calls().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn passing_tests_leave_no_artifacts() {
    let fixture = Fixture::new(1);
    fixture.clusters[0].add_namespace("ns-a", true);

    let mut suite = SuiteLifecycle::new(SUITE)
        .with_component(LogsSuite::with_collector(fixture.collector.clone()));
    suite.setup_suite().await.unwrap();
    suite.run_test("green", || async { Ok(()) }).await;
    suite.tear_down_suite().await;

    assert!(fixture.tool.dump_calls().is_empty());
    assert!(!fixture.label_dir(0, "basic/green").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn suite_monitor_streams_until_teardown() {
    let fixture = Fixture::new(1);
    let cluster = &fixture.clusters[0];
    let web = cluster.add_pod("ns-a", "web", &["app"], &[]);
    cluster.set_follow_lines(&web.pod, "app", &["started", "serving"], true);
    let sidecar = cluster.add_pod("spire", "agent", &["agent"], &[]);

    let mut suite = SuiteLifecycle::new(SUITE)
        .with_component(LogsSuite::with_collector(fixture.collector.clone()));
    suite.setup_suite().await.unwrap();
    cluster.emit(PodEvent::Added(web));
    cluster.emit(PodEvent::Added(sidecar));
    tokio::time::sleep(Duration::from_millis(100)).await;
    suite.tear_down_suite().await;

    let dir = fixture.label_dir(0, SUITE).join("ns-a");
    assert_eq!(
        fs::read_to_string(dir.join("web-app.log")).unwrap(),
        "started\nserving\n"
    );
    assert!(!fixture.label_dir(0, SUITE).join("spire").exists());
}
