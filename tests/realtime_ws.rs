use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Extension;
use chrono::Utc;
use quickpoll::client::{
    EventRouter, Notification, ReconnectPolicy, RealtimeClient, Subscription, WsConnector,
};
use quickpoll::realtime::{self, Broadcaster, Event, VoteSummary};
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn serve(broadcaster: Arc<Broadcaster>) -> SocketAddr {
    let app = realtime::routes().layer(Extension(broadcaster));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn vote_cast(poll_id: i64) -> Event {
    Event::VoteCast {
        poll_id,
        vote: VoteSummary {
            id: 11,
            poll_id,
            option_id: 2,
            user_id: "integration".into(),
            created_at: Utc::now(),
        },
    }
}

fn observe(router: &EventRouter) -> (Subscription, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = router.add_observer(move |n| {
        let _ = tx.send(n.clone());
    });
    (sub, rx)
}

async fn wait_for_sessions(broadcaster: &Broadcaster, n: usize) {
    timeout(Duration::from_secs(5), async {
        while broadcaster.registry().len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count never reached");
}

async fn next_event(seen: &mut mpsc::UnboundedReceiver<Notification>) -> Event {
    timeout(Duration::from_secs(5), async {
        loop {
            match seen.recv().await {
                Some(Notification::Event(event)) => return event,
                Some(_) => continue,
                None => panic!("router closed"),
            }
        }
    })
    .await
    .expect("no event delivered")
}

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        max_attempts: 3,
    }
}

#[tokio::test]
async fn published_events_reach_every_connected_client() {
    let broadcaster = Arc::new(Broadcaster::default());
    let addr = serve(Arc::clone(&broadcaster)).await;
    let url = format!("ws://{addr}/ws");

    let router_a = EventRouter::new();
    let (_sub_a, mut seen_a) = observe(&router_a);
    let client_a = RealtimeClient::spawn(WsConnector::new(url.clone()), policy(), router_a, || {});

    let router_b = EventRouter::new();
    let (_sub_b, mut seen_b) = observe(&router_b);
    let client_b = RealtimeClient::spawn(WsConnector::new(url), policy(), router_b, || {});

    client_a.wait_open().await.unwrap();
    client_b.wait_open().await.unwrap();
    wait_for_sessions(&broadcaster, 2).await;

    assert_eq!(broadcaster.publish(&vote_cast(7)).unwrap(), 2);
    assert_eq!(next_event(&mut seen_a).await.poll_id(), 7);
    assert_eq!(next_event(&mut seen_b).await.poll_id(), 7);

    client_a.disconnect();
    client_a.join().await;
    wait_for_sessions(&broadcaster, 1).await;

    assert_eq!(broadcaster.publish(&vote_cast(8)).unwrap(), 1);
    assert_eq!(next_event(&mut seen_b).await.poll_id(), 8);

    client_b.disconnect();
    client_b.join().await;
    wait_for_sessions(&broadcaster, 0).await;
}

#[tokio::test]
async fn server_side_session_close_makes_the_client_reconnect() {
    let broadcaster = Arc::new(Broadcaster::default());
    let addr = serve(Arc::clone(&broadcaster)).await;

    let router = EventRouter::new();
    let (_sub, mut seen) = observe(&router);
    let client = RealtimeClient::spawn(
        WsConnector::new(format!("ws://{addr}/ws")),
        policy(),
        router,
        || {},
    );
    client.wait_open().await.unwrap();
    wait_for_sessions(&broadcaster, 1).await;

    // Dropping every session ends the writer loop, which closes the socket
    // with a non-normal code.
    broadcaster.shutdown();

    let reconnected = timeout(Duration::from_secs(5), async {
        loop {
            match seen.recv().await {
                Some(Notification::Reconnected) => return true,
                Some(Notification::Unavailable) | None => return false,
                Some(_) => continue,
            }
        }
    })
    .await
    .expect("client never reconnected");
    assert!(reconnected);

    wait_for_sessions(&broadcaster, 1).await;
    assert_eq!(broadcaster.publish(&vote_cast(9)).unwrap(), 1);
    assert_eq!(next_event(&mut seen).await.poll_id(), 9);

    client.disconnect();
    client.join().await;
}
