use std::time::Duration;

use flight_motion::FlightSnapshot;
use jiff::Timestamp;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

use crate::{
    config::TrackerConfig,
    error::{ApplicationError, ApplicationResult},
};

#[derive(Debug, Deserialize)]
struct FeedBody {
    #[serde(default)]
    flights: Option<Vec<FlightSnapshot>>,
}

/// One successful poll of the feed.
#[derive(Debug, Clone)]
pub(crate) struct Batch {
    pub flights: Vec<FlightSnapshot>,
    pub fetched_at: Timestamp,
}

pub(crate) fn parse_feed_body(body: &[u8]) -> ApplicationResult<Vec<FlightSnapshot>> {
    let body: FeedBody = serde_json::from_slice(body)?;
    Ok(body.flights.unwrap_or_default())
}

#[derive(Debug)]
pub(crate) struct FlightFeed {
    client: Client,
    url: Url,
}

impl FlightFeed {
    pub fn new(config: &TrackerConfig) -> ApplicationResult<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            url: config.feed_url()?,
        })
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> ApplicationResult<Batch> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApplicationError::HttpStatus {
                url: self.url.to_string(),
                status,
            });
        }
        let body = response.bytes().await?;
        let flights = parse_feed_body(&body)?;
        debug!(flights = flights.len(), "Fetched flight snapshot");
        Ok(Batch {
            flights,
            fetched_at: Timestamp::now(),
        })
    }
}

/// Polls `feed` every `every` and whenever a refresh is requested, forwarding
/// each batch. A failed poll is logged and the next tick tries again. Returns
/// once the batch receiver is gone.
pub(crate) async fn poll_feed(
    feed: FlightFeed,
    every: Duration,
    mut refresh: mpsc::Receiver<()>,
    batches: mpsc::Sender<Batch>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(()) = refresh.recv() => {
                debug!("Manual refresh requested");
                ticker.reset();
            }
        }

        match feed.fetch().await {
            Ok(batch) => {
                if batches.send(batch).await.is_err() {
                    debug!("Batch receiver closed, stopping poll loop");
                    return;
                }
            }
            Err(e) => warn!("Failed to load flights: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_body() {
        let body = br#"{
            "flights": [
                {
                    "flight_id": "NAX123",
                    "airline": "Norwegian",
                    "current_position": {"latitude": 59.9, "longitude": 10.7, "altitude": 3000, "heading": 190, "speed": 250}
                },
                {"flight_id": "SAS456", "current_position": null},
                {"flight_id": "WIF789"}
            ]
        }"#;
        let flights = parse_feed_body(body).unwrap();
        assert_eq!(flights.len(), 3);
        assert_eq!(flights[0].position.unwrap().heading, 190.0);
        assert!(flights[1].position.is_none());
        assert!(flights[2].position.is_none());
    }

    #[test]
    fn test_parse_feed_body_without_flights() {
        assert!(parse_feed_body(b"{}").unwrap().is_empty());
        assert!(parse_feed_body(br#"{"flights": null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed_body_rejects_garbage() {
        let err = parse_feed_body(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ApplicationError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_poll_loop_survives_unreachable_feed() {
        let mut config = TrackerConfig::new_for_test();
        // nothing listens on the discard port
        config.endpoint = "http://127.0.0.1:9/api/flights".into();
        config.request_timeout_ms = 200;
        let feed = FlightFeed::new(&config).unwrap();

        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (batch_tx, mut batch_rx) = mpsc::channel(1);
        let poller = tokio::spawn(poll_feed(
            feed,
            Duration::from_millis(20),
            refresh_rx,
            batch_tx,
        ));
        refresh_tx.send(()).await.unwrap();

        let received =
            tokio::time::timeout(Duration::from_millis(300), batch_rx.recv()).await;
        assert!(received.is_err(), "no batch can arrive from a dead feed");
        assert!(!poller.is_finished(), "poll loop keeps running after failures");
        poller.abort();
    }
}
