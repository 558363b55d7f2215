//! Candidate scan: reads the feed, matches every extracted IP against the
//! registry and hands flagged records to the sink.
//!
//! Up to `workers` candidates are evaluated at once. `buffered` yields
//! their outcomes in feed order, so the sink always sees rows in the order
//! their lines appeared, whatever the lookup latencies.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncBufRead;
use tracing::debug;

use crate::annotator::{Annotator, Record};
use crate::error::InformerError;
use crate::matcher::match_ip;
use crate::reader::{extract_ip, CandidateReader};
use crate::registry::Registry;
use crate::report::RecordSink;
use crate::signal::ShutdownToken;
use crate::utils::truncate;

/// Counters reported once the scan ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Lines read from the feed
    pub lines: usize,
    /// Lines that yielded a valid IP
    pub processed: usize,
    /// Lines without a valid IP
    pub skipped: usize,
    /// IPs flagged by at least one list
    pub flagged: usize,
    /// Scan stopped early on a shutdown signal
    pub interrupted: bool,
}

enum Outcome {
    Skipped,
    Clean,
    Flagged(Record),
}

/// Streams one feed through match and annotation
pub struct Scanner<'a> {
    registry: &'a Registry,
    annotator: &'a Annotator,
    workers: usize,
    shutdown: Option<ShutdownToken>,
}

impl<'a> Scanner<'a> {
    pub fn new(registry: &'a Registry, annotator: &'a Annotator) -> Self {
        Self {
            registry,
            annotator,
            workers: 1,
            shutdown: None,
        }
    }

    /// Candidates evaluated concurrently (at least 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_shutdown(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Scan the whole feed.
    ///
    /// A read error ends the scan with `InformerError::Input`; rows emitted
    /// before it stay in the sink.
    pub async fn run<R, S>(
        &self,
        reader: &mut CandidateReader<R>,
        sink: &mut S,
    ) -> Result<ScanSummary>
    where
        R: AsyncBufRead + Unpin,
        S: RecordSink + ?Sized,
    {
        let shutdown = self.shutdown.clone();

        let lines = stream::unfold(Some(reader), move |state| {
            let shutdown = shutdown.clone();
            async move {
                let Some(reader) = state else {
                    return None;
                };
                let next = match &shutdown {
                    Some(token) => {
                        if token.is_cancelled() {
                            return None;
                        }
                        // An idle feed must not hold the scan past a signal
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => return None,
                            line = reader.next_line() => line,
                        }
                    }
                    None => reader.next_line().await,
                };
                match next {
                    Ok(Some(line)) => Some((Ok(line), Some(reader))),
                    Ok(None) => None,
                    // Report the error, then end the stream
                    Err(e) => Some((Err(e), None)),
                }
            }
        });

        let outcomes = lines
            .map(move |line| async move {
                match line {
                    Ok(line) => Ok(self.evaluate(&line).await),
                    Err(e) => Err(e),
                }
            })
            .buffered(self.workers);
        let mut outcomes = std::pin::pin!(outcomes);

        let mut summary = ScanSummary::default();
        while let Some(outcome) = outcomes.next().await {
            let outcome = outcome.map_err(|e| {
                InformerError::Input(format!("read failed after {} lines ({})", summary.lines, e))
            })?;
            summary.lines += 1;

            match outcome {
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Clean => summary.processed += 1,
                Outcome::Flagged(record) => {
                    summary.processed += 1;
                    summary.flagged += 1;
                    sink.emit(&record)?;
                }
            }
        }

        summary.interrupted = self
            .shutdown
            .as_ref()
            .is_some_and(ShutdownToken::is_cancelled);

        Ok(summary)
    }

    async fn evaluate(&self, line: &str) -> Outcome {
        let Some(ip) = extract_ip(line) else {
            if !line.is_empty() {
                debug!("No IP in line: {}", truncate(line, 60));
            }
            return Outcome::Skipped;
        };

        let membership = match_ip(ip, self.registry);
        match self.annotator.annotate(ip, membership).await {
            Some(record) => Outcome::Flagged(record),
            None => Outcome::Clean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListMethod, ListSourceConfig};
    use crate::geo::MockGeoLookup;
    use crate::matcher::Membership;
    use crate::registry::ListSource;
    use crate::reputation::{ReputationLookup, ReputationReport};
    use async_trait::async_trait;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, ReadBuf};

    fn registry(lists: &[(&str, Option<&[&str]>)]) -> Registry {
        let sources = lists
            .iter()
            .map(|(short, members)| {
                let source = ListSource::from_config(&ListSourceConfig::new(
                    short,
                    ListMethod::File,
                    "/dev/null",
                    short,
                ));
                match members {
                    Some(members) => {
                        source.with_members(members.iter().map(|m| m.to_string()).collect())
                    }
                    None => source,
                }
            })
            .collect();
        Registry::new(sources).unwrap()
    }

    fn scenario_registry() -> Registry {
        registry(&[("A", Some(&["1.2.3.4"][..])), ("B", Some(&["5.6.7.8"][..]))])
    }

    async fn scan(
        registry: &Registry,
        annotator: &Annotator,
        feed: &[u8],
        workers: usize,
    ) -> (ScanSummary, Vec<Record>) {
        let mut reader = CandidateReader::new(feed);
        let mut records = Vec::new();
        let summary = Scanner::new(registry, annotator)
            .with_workers(workers)
            .run(&mut reader, &mut records)
            .await
            .unwrap();
        (summary, records)
    }

    /// Sleeps longer for lower last octets so later lines finish first
    struct SlowReputation;

    #[async_trait]
    impl ReputationLookup for SlowReputation {
        async fn lookup(&self, ip: &str) -> Result<ReputationReport> {
            let last: u64 = ip.rsplit('.').next().and_then(|o| o.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(100 - last)).await;
            Ok(ReputationReport::default())
        }
    }

    struct FailingRead;

    impl AsyncRead for FailingRead {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk gone")))
        }
    }

    #[tokio::test]
    async fn test_mixed_feed() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let (summary, records) =
            scan(&registry, &annotator, b"1.2.3.4\n9.9.9.9\n5.6.7.8 extra text\n\n", 1).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ip, "1.2.3.4");
        assert_eq!(records[0].membership, Membership::new(vec![true, false]));
        assert_eq!(records[1].ip, "5.6.7.8");
        assert_eq!(records[1].membership, Membership::new(vec![false, true]));

        assert_eq!(
            summary,
            ScanSummary {
                lines: 4,
                processed: 3,
                skipped: 1,
                flagged: 2,
                interrupted: false,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_list_column_stays_false() {
        let registry = registry(&[("A", None), ("B", Some(&["5.6.7.8"][..]))]);
        let annotator = Annotator::new();
        let (summary, records) = scan(&registry, &annotator, b"1.2.3.4\n5.6.7.8\n", 1).await;

        assert_eq!(summary.flagged, 1);
        assert_eq!(records[0].ip, "5.6.7.8");
        assert_eq!(records[0].membership, Membership::new(vec![false, true]));
    }

    #[tokio::test]
    async fn test_garbage_line_does_not_disturb_neighbours() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let (summary, records) =
            scan(&registry, &annotator, b"1.2.3.4\n\xff\xfe garbage ::\n5.6.7.8\n", 1).await;

        assert_eq!(summary.skipped, 1);
        let ips: Vec<_> = records.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[tokio::test]
    async fn test_geo_not_called_for_clean_ips() {
        let registry = scenario_registry();
        let mut geo = MockGeoLookup::new();
        geo.expect_country()
            .times(1)
            .returning(|_| Some("Netherlands".to_string()));
        let annotator = Annotator::new().with_geo(Box::new(geo));

        let (_, records) = scan(&registry, &annotator, b"9.9.9.9\n1.2.3.4\n8.8.8.8\n", 1).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].country.as_deref(), Some("Netherlands"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_keep_feed_order() {
        let members: Vec<String> = (1..=20).map(|i| format!("10.0.0.{}", i)).collect();
        let members: Vec<&str> = members.iter().map(String::as_str).collect();
        let registry = registry(&[("A", Some(&members[..]))]);
        let annotator = Annotator::new().with_reputation(Box::new(SlowReputation));

        let feed: String = (1..=20).map(|i| format!("10.0.0.{}\n", i)).collect();
        let (summary, records) = scan(&registry, &annotator, feed.as_bytes(), 8).await;

        assert_eq!(summary.flagged, 20);
        let ips: Vec<_> = records.iter().map(|r| r.ip.clone()).collect();
        let expected: Vec<_> = (1..=20).map(|i| format!("10.0.0.{}", i)).collect();
        assert_eq!(ips, expected);
    }

    #[tokio::test]
    async fn test_same_input_same_records() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let feed = b"5.6.7.8\n1.2.3.4\n1.2.3.4\n";
        let (first, a) = scan(&registry, &annotator, feed, 3).await;
        let (second, b) = scan(&registry, &annotator, feed, 1).await;
        assert_eq!(first, second);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let token = ShutdownToken::new();
        token.cancel();

        let mut reader = CandidateReader::new(&b"1.2.3.4\n5.6.7.8\n"[..]);
        let mut records = Vec::new();
        let summary = Scanner::new(&registry, &annotator)
            .with_shutdown(token)
            .run(&mut reader, &mut records)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.lines, 0);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_feed_idle() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let (mut writer, idle) = tokio::io::duplex(64);
        writer.write_all(b"1.2.3.4\n").await.unwrap();
        let mut reader = CandidateReader::new(BufReader::new(idle));
        let mut records = Vec::new();

        let token = ShutdownToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let scanner = Scanner::new(&registry, &annotator).with_shutdown(token);
        let summary = tokio::time::timeout(
            Duration::from_secs(2),
            scanner.run(&mut reader, &mut records),
        )
        .await
        .expect("scan returns once cancelled")
        .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.lines, 1);
        assert_eq!(records.len(), 1);
        drop(writer);
    }

    #[tokio::test]
    async fn test_read_error_is_fatal_but_keeps_earlier_rows() {
        let registry = scenario_registry();
        let annotator = Annotator::new();
        let input = (&b"1.2.3.4\n"[..]).chain(FailingRead);
        let mut reader = CandidateReader::new(BufReader::new(input));
        let mut records = Vec::new();

        let err = Scanner::new(&registry, &annotator)
            .run(&mut reader, &mut records)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InformerError>(),
            Some(InformerError::Input(_))
        ));
        assert_eq!(records.len(), 1);
    }
}
