use crate::{payload, start_server, Fixture};
use chunkdl::{ByteCounter, ChunkErrorKind, ChunkdlError, ConfigBuilder, Downloader, Result};
use log::LevelFilter;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

fn init_logging() {
    let _ = pretty_env_logger::formatted_builder()
        .filter(Some("chunkdl"), LevelFilter::Debug)
        .filter(Some("warp"), LevelFilter::Info)
        .try_init();
}

#[tokio::test]
async fn local() -> Result<()> {
    init_logging();
    let data = payload(100_003);
    let (url, _fx) = start_server(Fixture::new(data.clone()));
    for i in 1..=10 {
        let dl = Downloader::new(&url, i).await?;
        assert_eq!(dl.plan().len(), i);
        let table = dl.download().await?;
        assert_eq!(table.to_vec(), data, "mismatch with {} chunks", i);
        assert_eq!(dl.bytes_observed(), data.len() as u64);
    }
    Ok(())
}

#[tokio::test]
async fn progress_total_with_out_of_order_completion() -> Result<()> {
    init_logging();
    let data = payload(40_000);
    let (url, _fx) = start_server(Fixture {
        reversed_latency: true,
        ..Fixture::new(data.clone())
    });
    let sink = Arc::new(ByteCounter::new());
    let mut dl = Downloader::new(&url, 4).await?;
    dl.connect_progress(sink.clone());
    let table = dl.download().await?;
    assert_eq!(table.to_vec(), data);
    assert_eq!(sink.total(), 40_000);
    assert_eq!(dl.bytes_observed(), 40_000);
    Ok(())
}

#[tokio::test]
async fn saves_into_directory_with_content_type_name() -> Result<()> {
    init_logging();
    let data = payload(5_000);
    let (url, _fx) = start_server(Fixture {
        content_type: Some("application/zip"),
        ..Fixture::new(data.clone())
    });
    let dir = tempfile::tempdir().unwrap();
    let dl = Downloader::new(&url, 3).await?;
    let saved = dl.download_and_save(dir.path()).await?;
    assert_eq!(saved, dir.path().join("download.zip"));
    assert_eq!(std::fs::read(&saved).unwrap(), data);
    Ok(())
}

#[tokio::test]
async fn explicit_file_path_is_used_as_is() -> Result<()> {
    init_logging();
    let data = payload(777);
    let (url, _fx) = start_server(Fixture {
        content_type: None,
        ..Fixture::new(data.clone())
    });
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("named.out");
    let dl = Downloader::new(&url, 6).await?;
    assert_eq!(dl.filename(), "download.bin");
    let saved = dl.download_and_save(&target).await?;
    assert_eq!(saved, target);
    assert_eq!(std::fs::read(&target).unwrap(), data);
    Ok(())
}

#[tokio::test]
async fn failed_chunk_fails_the_download() -> Result<()> {
    init_logging();
    let (url, fx) = start_server(Fixture {
        failing_start: Some(500),
        ..Fixture::new(payload(1000))
    });
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let dl = Downloader::new(&url, 4).await?;
    let ranges = dl
        .plan()
        .iter()
        .map(|r| (r.start, r.end))
        .collect::<Vec<_>>();
    assert_eq!(ranges, vec![(0, 249), (250, 499), (500, 749), (750, 999)]);

    let err = dl.download_and_save(&target).await.unwrap_err();
    assert_eq!(err.failed_chunks(), vec![2]);
    match &err {
        ChunkdlError::ChunkFetch(failures) => {
            assert_eq!(failures[0].range.start, 500);
            assert!(matches!(failures[0].kind, ChunkErrorKind::UnexpectedStatus(503)));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!target.exists());
    // siblings were not cancelled
    assert_eq!(fx.gets(), 4);
    assert_eq!(dl.bytes_observed(), 750);
    Ok(())
}

#[tokio::test]
async fn range_unsupported_stops_before_fetching() {
    init_logging();
    let (url, fx) = start_server(Fixture {
        accept_ranges: Some("none"),
        ..Fixture::new(payload(1000))
    });
    let err = Downloader::new(&url, 4).await.unwrap_err();
    assert!(matches!(err, ChunkdlError::RangeUnsupported));
    assert_eq!(fx.gets(), 0);
}

#[tokio::test]
async fn head_status_is_reported() {
    init_logging();
    let (url, fx) = start_server(Fixture {
        head_status: StatusCode::NOT_FOUND,
        ..Fixture::new(payload(10))
    });
    let err = Downloader::new(&url, 2).await.unwrap_err();
    assert!(matches!(err, ChunkdlError::UnexpectedStatus(404)));
    assert_eq!(fx.gets(), 0);
}

#[tokio::test]
async fn empty_resource_writes_empty_file() -> Result<()> {
    init_logging();
    let (url, fx) = start_server(Fixture::new(Vec::new()));
    let dir = tempfile::tempdir().unwrap();
    let dl = Downloader::new(&url, 6).await?;
    assert!(dl.plan().is_empty());
    let saved = dl.download_and_save(dir.path()).await?;
    assert_eq!(std::fs::metadata(&saved).unwrap().len(), 0);
    assert_eq!(fx.gets(), 0);
    Ok(())
}

#[tokio::test]
async fn more_chunks_than_bytes() -> Result<()> {
    init_logging();
    let data = payload(5);
    let (url, fx) = start_server(Fixture::new(data.clone()));
    let dl = Downloader::new(&url, 8).await?;
    assert_eq!(dl.plan().len(), 5);
    assert_eq!(dl.download().await?.to_vec(), data);
    assert_eq!(fx.gets(), 5);
    Ok(())
}

#[tokio::test]
async fn zero_chunks_is_rejected() {
    init_logging();
    let (url, fx) = start_server(Fixture::new(payload(10)));
    let err = Downloader::new(&url, 0).await.unwrap_err();
    assert!(matches!(err, ChunkdlError::InvalidConfiguration(_)));
    assert_eq!(fx.gets(), 0);
}

#[tokio::test]
async fn concurrency_ceiling_keeps_content() -> Result<()> {
    init_logging();
    let data = payload(9_999);
    let (url, _fx) = start_server(Fixture {
        reversed_latency: true,
        ..Fixture::new(data.clone())
    });
    let config = ConfigBuilder::default()
        .chunks(5)
        .max_concurrency(1)
        .build()?;
    let dl = Downloader::with_config(&url, config).await?;
    assert_eq!(dl.download().await?.to_vec(), data);
    Ok(())
}

#[tokio::test]
async fn deadline_aborts_slow_download() -> Result<()> {
    init_logging();
    let (url, _fx) = start_server(Fixture {
        delay: Duration::from_secs(5),
        ..Fixture::new(payload(1000))
    });
    let config = ConfigBuilder::default()
        .chunks(2)
        .deadline(Duration::from_millis(200))
        .build()?;
    let dl = Downloader::with_config(&url, config).await?;
    let err = dl.download().await.unwrap_err();
    assert!(matches!(err, ChunkdlError::DeadlineExceeded(_)));
    Ok(())
}

#[tokio::test]
async fn full_body_answers_to_ranges_are_rejected() -> Result<()> {
    init_logging();
    let (url, _fx) = start_server(Fixture {
        ignore_ranges: true,
        ..Fixture::new(payload(1000))
    });
    let dl = Downloader::new(&url, 2).await?;
    let err = dl.download().await.unwrap_err();
    assert_eq!(err.failed_chunks(), vec![0, 1]);

    // a single chunk spans the whole resource, so 200 is fine
    let dl = Downloader::new(&url, 1).await?;
    assert_eq!(dl.download().await?.to_vec(), payload(1000));
    Ok(())
}

#[tokio::test]
async fn oversized_announced_length_fails_chunks() -> Result<()> {
    init_logging();
    let (url, _fx) = start_server(Fixture {
        advertised_len: Some(6_000_000_000_000_000_000),
        ..Fixture::new(payload(1000))
    });
    let dl = Downloader::new(&url, 6).await?;
    assert_eq!(dl.get_len(), 6_000_000_000_000_000_000);
    assert_eq!(dl.plan().len(), 6);
    let err = dl.download().await.unwrap_err();
    assert_eq!(err.failed_chunks(), vec![0, 1, 2, 3, 4, 5]);
    match &err {
        ChunkdlError::ChunkFetch(failures) => {
            for f in failures {
                assert!(matches!(f.kind, ChunkErrorKind::LengthMismatch { .. }));
            }
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[tokio::test]
async fn overlong_parts_are_cut_off() -> Result<()> {
    init_logging();
    let (url, _fx) = start_server(Fixture {
        overlong_parts: true,
        ..Fixture::new(payload(1000))
    });
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let dl = Downloader::new(&url, 4).await?;
    let err = dl.download_and_save(&target).await.unwrap_err();
    assert_eq!(err.failed_chunks(), vec![0, 1, 2, 3]);
    match &err {
        ChunkdlError::ChunkFetch(failures) => {
            for f in failures {
                match f.kind {
                    ChunkErrorKind::LengthMismatch { expected, received } => {
                        assert_eq!(expected, 250);
                        assert!(received > expected);
                    }
                    ref other => panic!("unexpected kind: {}", other),
                }
            }
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!target.exists());
    // nothing past a range's end is counted
    assert!(dl.bytes_observed() <= 1000);
    Ok(())
}

#[tokio::test]
async fn repeated_download_counts_from_zero() -> Result<()> {
    init_logging();
    let data = payload(100);
    let (url, fx) = start_server(Fixture::new(data.clone()));
    let dl = Downloader::new(&url, 4).await?;
    for _ in 0..2 {
        assert_eq!(dl.download().await?.to_vec(), data);
        assert_eq!(dl.bytes_observed(), 100);
    }
    assert_eq!(fx.gets(), 8);
    Ok(())
}

#[tokio::test]
async fn output_path_resolution() -> Result<()> {
    init_logging();
    let (url, _fx) = start_server(Fixture {
        content_type: Some("text/plain"),
        ..Fixture::new(payload(10))
    });
    let dir = tempfile::tempdir().unwrap();
    let dl = Downloader::new(&url, 2).await?;
    assert_eq!(
        dl.resolve_output(dir.path()).await,
        dir.path().join("download.plain")
    );
    let file = dir.path().join("missing.txt");
    assert_eq!(dl.resolve_output(&file).await, file);
    Ok(())
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    init_logging();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{}/fixture.bin", port);
    let err = Downloader::new(&url, 2).await.unwrap_err();
    match err {
        ChunkdlError::Transport(e) => assert!(e.is_connect(), "not a connect error: {}", e),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn chunk_request_timeout_is_a_transport_error() -> Result<()> {
    init_logging();
    let (url, fx) = start_server(Fixture {
        delay: Duration::from_secs(5),
        ..Fixture::new(payload(1000))
    });
    let config = ConfigBuilder::default()
        .chunks(2)
        .request_timeout(Duration::from_millis(200))
        .build()?;
    let dl = Downloader::with_config(&url, config).await?;
    let err = dl.download().await.unwrap_err();
    assert_eq!(err.failed_chunks(), vec![0, 1]);
    match &err {
        ChunkdlError::ChunkFetch(failures) => {
            for f in failures {
                match &f.kind {
                    ChunkErrorKind::Transport(e) => assert!(e.is_timeout()),
                    other => panic!("unexpected kind: {}", other),
                }
            }
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fx.gets(), 2);
    Ok(())
}
