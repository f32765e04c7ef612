//! Integration tests for metrics collection
//!
//! These tests use a mock sysfs tree and a fake `docker` executable to test
//! collection without requiring a real container runtime.

#[cfg(test)]
mod mock_sysfs_tests {
    use crate::collector::{read_max_thermal, HostSource, SystemHostCollector};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::fs;

    /// Helper to create a mock thermal class directory
    async fn create_mock_thermal(temp_dir: &TempDir, zones: &[(&str, &str)]) -> PathBuf {
        let root = temp_dir.path().join("thermal");
        fs::create_dir_all(&root).await.unwrap();

        for (zone, temp) in zones {
            let zone_path = root.join(zone);
            fs::create_dir_all(&zone_path).await.unwrap();
            fs::write(zone_path.join("temp"), temp).await.unwrap();
        }

        root
    }

    #[tokio::test]
    async fn test_max_thermal_zone_wins() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_thermal(
            &temp_dir,
            &[("thermal_zone0", "45000\n"), ("thermal_zone1", "67840\n")],
        )
        .await;

        assert_eq!(read_max_thermal(&root).await, Some(67.8));
    }

    #[tokio::test]
    async fn test_unreadable_zones_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_thermal(
            &temp_dir,
            &[("thermal_zone0", "garbage"), ("thermal_zone1", "52000")],
        )
        .await;

        // Zone directory without a temp file
        fs::create_dir_all(root.join("cooling_device0")).await.unwrap();

        assert_eq!(read_max_thermal(&root).await, Some(52.0));
    }

    #[tokio::test]
    async fn test_missing_thermal_root() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(read_max_thermal(&temp_dir.path().join("absent")).await, None);

        let empty = create_mock_thermal(&temp_dir, &[]).await;
        assert_eq!(read_max_thermal(&empty).await, None);
    }

    #[tokio::test]
    async fn test_host_collector_reports_temperature() {
        let temp_dir = TempDir::new().unwrap();
        let root = create_mock_thermal(&temp_dir, &[("thermal_zone0", "91500")]).await;

        // A mount point that does not exist yields no disk entries
        let collector = SystemHostCollector::new(vec!["/definitely/not/mounted".to_string()])
            .with_thermal_root(root)
            .with_gpu_command(None);
        let sample = collector.collect().await.unwrap();

        assert_eq!(sample.cpu_temp, Some(91.5));
        assert_eq!(sample.gpu_temp, None);
        assert!(sample.disk.is_empty());
    }
}

#[cfg(all(test, unix))]
mod fake_docker_tests {
    use crate::anomaly::AnomalyDetector;
    use crate::collector::{
        read_gpu_temp, ContainerSource, DockerCliCollector, HostSource, ImageSource,
        SystemHostCollector,
    };
    use crate::models::{AlertKind, HostSample};
    use chrono::Utc;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for a CLI tool
    fn fake_tool(temp_dir: &TempDir, name: &str, script: &str) -> PathBuf {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn fake_docker(temp_dir: &TempDir, script: &str) -> PathBuf {
        fake_tool(temp_dir, "docker", script)
    }

    #[tokio::test]
    async fn test_collect_joins_stats_and_inspect() {
        let temp_dir = TempDir::new().unwrap();
        let script = r#"#!/bin/sh
case "$1" in
  stats)
    echo '{"BlockIO":"0B / 0B","CPUPerc":"91.00%","ID":"aaaaaaaaaaaaaaaa","MemPerc":"50.00%","MemUsage":"512MiB / 1GiB","Name":"web","NetIO":"2MB / 1MB"}'
    echo '{"BlockIO":"0B / 0B","CPUPerc":"1.00%","ID":"bbbbbbbbbbbbbbbb","MemPerc":"5.00%","MemUsage":"10MiB / 1GiB","Name":"db","NetIO":"1kB / 1kB"}'
    ;;
  inspect)
    echo 'aaaaaaaaaaaaaaaa 4 running nginx:latest'
    echo 'bbbbbbbbbbbbbbbb 0 running postgres:16'
    ;;
esac
"#;
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, script));
        let samples = collector.collect().await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "web");
        assert_eq!(samples[0].cpu_pct, 91.0);
        assert_eq!(samples[0].restart_count, 4);
        assert_eq!(samples[0].net_rx, 2_000_000);
        assert_eq!(samples[0].image, "nginx:latest");
        assert_eq!(samples[1].name, "db");
        assert_eq!(samples[1].status, "running");
    }

    #[tokio::test]
    async fn test_no_running_containers() {
        let temp_dir = TempDir::new().unwrap();
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, "#!/bin/sh\nexit 0\n"));

        assert!(collector.collect().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_stats_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let script = "#!/bin/sh\necho 'Cannot connect to the Docker daemon' >&2\nexit 1\n";
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, script));

        let err = collector.collect().await.unwrap_err();
        assert!(err.to_string().contains("Cannot connect"));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, "#!/bin/sh\nsleep 5\n"))
            .with_timeout(Duration::from_millis(100));

        let err = collector.collect().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let collector = DockerCliCollector::new("/nonexistent/docker");
        assert!(collector.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_partial_inspect_keeps_found_records() {
        let temp_dir = TempDir::new().unwrap();
        // web exited between stats and inspect; docker still prints db
        let script = r#"#!/bin/sh
case "$1" in
  stats)
    echo '{"CPUPerc":"1.00%","ID":"aaaaaaaaaaaaaaaa","MemPerc":"5.00%","Name":"web"}'
    echo '{"CPUPerc":"1.00%","ID":"bbbbbbbbbbbbbbbb","MemPerc":"5.00%","Name":"db"}'
    ;;
  inspect)
    echo 'bbbbbbbbbbbbbbbb 2 running postgres:16'
    echo 'Error: No such object: aaaaaaaaaaaaaaaa' >&2
    exit 1
    ;;
esac
"#;
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, script));
        let samples = collector.collect().await.unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "db");
        assert_eq!(samples[0].restart_count, 2);
    }

    #[tokio::test]
    async fn test_failed_inspect_does_not_fake_a_restart() {
        let temp_dir = TempDir::new().unwrap();
        let script = r#"#!/bin/sh
dir=$(dirname "$0")
case "$1" in
  stats)
    echo '{"CPUPerc":"1.00%","ID":"aaaaaaaaaaaaaaaa","MemPerc":"5.00%","Name":"web"}'
    ;;
  inspect)
    if [ -f "$dir/inspect_fails" ]; then
      echo 'Error: No such object: aaaaaaaaaaaaaaaa' >&2
      exit 1
    fi
    echo 'aaaaaaaaaaaaaaaa 7 running nginx:latest'
    ;;
esac
"#;
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, script));
        let marker = temp_dir.path().join("inspect_fails");
        let mut detector = AnomalyDetector::default();
        let host = HostSample::new(Utc::now());

        let first = collector.collect().await.unwrap();
        assert_eq!(first[0].restart_count, 7);
        assert!(detector.check(&first, &host).is_empty());

        std::fs::write(&marker, "").unwrap();
        let second = collector.collect().await.unwrap();
        assert!(second.is_empty());
        assert!(detector.check(&second, &host).is_empty());

        std::fs::remove_file(&marker).unwrap();
        let third = collector.collect().await.unwrap();
        assert_eq!(third[0].restart_count, 7);
        let alerts = detector.check(&third, &host);
        assert!(alerts.iter().all(|a| a.kind != AlertKind::Restart));
        assert_eq!(detector.state().prev_restarts("web"), Some(7));
    }

    #[tokio::test]
    async fn test_image_usage_from_system_df() {
        let temp_dir = TempDir::new().unwrap();
        let script = r#"#!/bin/sh
if [ "$1" = "system" ] && [ "$2" = "df" ]; then
  echo '{"Active":"2","Size":"2GB","TotalCount":"6","Type":"Images"}'
  echo '{"Active":"1","Size":"1.5MB","TotalCount":"2","Type":"Containers"}'
  echo '{"Active":"1","Size":"300MB","TotalCount":"3","Type":"Local Volumes"}'
  echo '{"Active":"0","Size":"0B","TotalCount":"0","Type":"Build Cache"}'
  exit 0
fi
exit 1
"#;
        let collector = DockerCliCollector::new(fake_docker(&temp_dir, script));
        let usage = collector.collect_images().await.unwrap();

        assert_eq!(usage.image_count, 6);
        assert_eq!(usage.image_size, 2_000_000_000);
        assert_eq!(usage.container_rw_size, 1_500_000);
        assert_eq!(usage.volume_count, 3);
        assert_eq!(usage.volume_size, 300_000_000);
        assert_eq!(usage.cache_size, 0);
    }

    #[tokio::test]
    async fn test_gpu_temp_takes_hottest_gpu() {
        let temp_dir = TempDir::new().unwrap();
        let smi = fake_tool(&temp_dir, "nvidia-smi", "#!/bin/sh\necho 45\necho 61\n");

        assert_eq!(read_gpu_temp(&smi, Duration::from_secs(5)).await, Some(61.0));

        let collector = SystemHostCollector::new(Vec::new())
            .with_thermal_root(temp_dir.path().join("no-thermal"))
            .with_gpu_command(Some(smi));
        let sample = collector.collect().await.unwrap();
        assert_eq!(sample.gpu_temp, Some(61.0));
        assert_eq!(sample.cpu_temp, None);
    }

    #[tokio::test]
    async fn test_gpu_temp_absent_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let failing = fake_tool(&temp_dir, "smi-fail", "#!/bin/sh\necho 'NVIDIA-SMI has failed'\nexit 9\n");
        let garbage = fake_tool(&temp_dir, "smi-garbage", "#!/bin/sh\necho '[N/A]'\n");
        let slow = fake_tool(&temp_dir, "smi-slow", "#!/bin/sh\nsleep 5\n");

        assert_eq!(read_gpu_temp(&failing, Duration::from_secs(5)).await, None);
        assert_eq!(read_gpu_temp(&garbage, Duration::from_secs(5)).await, None);
        assert_eq!(read_gpu_temp(&slow, Duration::from_millis(100)).await, None);
        assert_eq!(
            read_gpu_temp(&temp_dir.path().join("missing"), Duration::from_secs(5)).await,
            None
        );
    }
}
