// Integration tests for the hub over real TCP connections
//
// These tests verify that:
// 1. Every command answers with the documented line
// 2. Messages reach exactly the listed destinations, all-or-nothing
// 3. Disconnected clients disappear from listings and stop being addressable
// 4. Shutdown notifies every client and waits for all sessions to exit
//
// Each test runs its own hub on 127.0.0.1 with an OS-assigned port.
//
// Run with: cargo test --test hub_integration_test

use std::net::SocketAddr;
use std::time::Duration;

use msghub::{Hub, HubConfig, HubError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_LINE: &str = "System message: Server shutting down...";

struct TestHub {
    hub: Hub,
    addr: SocketAddr,
    token: CancellationToken,
    serving: JoinHandle<Result<(), HubError>>,
}

impl TestHub {
    async fn start() -> Self {
        Self::start_with(HubConfig {
            read_timeout_secs: 1,
            shutdown_grace_secs: 2,
            ..HubConfig::default()
        })
        .await
    }

    async fn start_with(config: HubConfig) -> Self {
        let token = CancellationToken::new();
        let hub = Hub::new(config, &token);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = tokio::spawn({
            let hub = hub.clone();
            async move { hub.serve(listener).await }
        });

        Self {
            hub,
            addr,
            token,
            serving,
        }
    }

    /// Connect a client and consume the welcome text.
    async fn connect(&self, name: &str) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut client = TestClient {
            name: name.to_string(),
            lines: BufReader::new(read_half).lines(),
            writer,
        };
        client.skip_welcome().await;
        client
    }

    async fn stop(self) {
        self.token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), self.serving)
            .await
            .expect("hub did not stop")
            .unwrap();
        assert!(result.is_ok(), "serve returned {result:?}");
    }
}

struct TestClient {
    name: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap_or_else(|e| panic!("[{}] send failed: {e}", self.name));
    }

    /// Next line, or `None` once the server closed the connection.
    async fn next(&mut self) -> Option<String> {
        tokio::time::timeout(CLIENT_READ_TIMEOUT, self.lines.next_line())
            .await
            .unwrap_or_else(|_| panic!("[{}] timed out waiting for a line", self.name))
            .unwrap_or_else(|e| panic!("[{}] read failed: {e}", self.name))
    }

    async fn expect(&mut self, want: &str) {
        let got = self.next().await;
        assert_eq!(got.as_deref(), Some(want), "[{}] unexpected line", self.name);
    }

    async fn expect_closed(&mut self) {
        let got = self.next().await;
        assert_eq!(got, None, "[{}] expected connection to close", self.name);
    }

    async fn skip_welcome(&mut self) {
        while let Some(line) = self.next().await {
            if line == "----" {
                return;
            }
        }
        panic!("[{}] connection closed during welcome", self.name);
    }

    /// Ask for our id.
    async fn id(&mut self) -> String {
        self.send("a").await;
        self.next().await.expect("connection closed")
    }
}

/// Poll `w` until it returns `want` or a few seconds pass.
async fn wait_for_listing(client: &mut TestClient, want: &str) {
    for _ in 0..40 {
        client.send("w").await;
        if client.next().await.as_deref() == Some(want) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("[{}] listing never became {want:?}", client.name);
}

#[tokio::test]
async fn test_commands_one_client() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;

    let cases = [
        ("a", "1"),
        ("w", "No other clients seem to have connected."),
        ("s 1 test", "Error in command: Can't send messages to yourself!"),
        ("s 1", "Error in command: Invalid parameters"),
        ("s x test", "Error in command: Invalid destination x: invalid digit found in string"),
        ("s , test", "Error in command: No clients specified"),
        ("s +1 test", "Error in command: Invalid destination +1: invalid digit found in string"),
        ("hello", "Error in command: Unhandled command"),
    ];

    for (input, expected) in cases {
        alice.send(input).await;
        alice.expect(expected).await;
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_blank_lines_are_ignored() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;

    alice.send("").await;
    alice.send("   ").await;
    alice.send("  a  ").await;
    alice.expect("1").await;

    hub.stop().await;
}

#[tokio::test]
async fn test_help_resends_welcome() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;

    alice.send("?").await;
    alice.expect("Welcome! Commands:").await;
    alice.expect("w  ask for clients").await;
    alice.expect("s  broadcast message (example: s 1,2 message)").await;
    alice.skip_welcome().await;
    assert_eq!(alice.id().await, "1");

    hub.stop().await;
}

#[tokio::test]
async fn test_commands_chat() {
    let hub = TestHub::start().await;
    let mut clients = vec![
        hub.connect("alice").await,
        hub.connect("bob").await,
        hub.connect("charlie").await,
    ];

    // (sender, payload, [(receiver, expected line)])
    let cases: Vec<(usize, &str, Vec<(usize, &str)>)> = vec![
        (0, "a", vec![(0, "1")]),
        (1, "a", vec![(1, "2")]),
        (1, "w", vec![(1, "List of clients: 1,3")]),
        (0, "w", vec![(0, "List of clients: 2,3")]),
        (0, "s 2 test", vec![(0, "Sent to 1 client"), (1, "Message from 1: test")]),
        (
            1,
            "s 1,3 test...",
            vec![
                (1, "Sent to 2 clients"),
                (0, "Message from 2: test..."),
                (2, "Message from 2: test..."),
            ],
        ),
        (2, "s 1,1 dup", vec![(2, "Sent to 1 client"), (0, "Message from 3: dup")]),
        (
            0,
            "s 2 spaced   out  text",
            vec![(0, "Sent to 1 client"), (1, "Message from 1: spaced   out  text")],
        ),
    ];

    for (sender, payload, expectations) in cases {
        clients[sender].send(payload).await;
        for (receiver, expected) in expectations {
            clients[receiver].expect(expected).await;
        }
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_destination_delivers_nothing() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;
    let mut bob = hub.connect("bob").await;

    alice.send("s 2,9 hello").await;
    alice.expect("Error in command: Invalid destination 9: Not connected").await;

    // Bob's next line is the answer to his own query, not a stray message.
    assert_eq!(bob.id().await, "2");

    hub.stop().await;
}

#[tokio::test]
async fn test_disconnect_command_removes_client() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;
    let mut bob = hub.connect("bob").await;
    let mut carol = hub.connect("carol").await;

    bob.send("d").await;
    bob.expect("Disconnecting...").await;
    bob.expect_closed().await;

    alice.send("w").await;
    alice.expect("List of clients: 3").await;

    alice.send("s 2 are you there").await;
    alice.expect("Error in command: Invalid destination 2: Not connected").await;

    alice.send("s 2,3 partial").await;
    alice.expect("Error in command: Invalid destination 2: Not connected").await;
    assert_eq!(carol.id().await, "3");

    hub.stop().await;
}

#[tokio::test]
async fn test_peer_close_removes_client() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;
    let bob = hub.connect("bob").await;

    drop(bob);
    wait_for_listing(&mut alice, "No other clients seem to have connected.").await;

    alice.send("s 2 hello").await;
    alice.expect("Error in command: Invalid destination 2: Not connected").await;

    hub.stop().await;
}

#[tokio::test]
async fn test_ids_are_never_reused() {
    let hub = TestHub::start().await;

    let mut first = hub.connect("first").await;
    assert_eq!(first.id().await, "1");
    first.send("d").await;
    first.expect("Disconnecting...").await;
    first.expect_closed().await;

    let mut second = hub.connect("second").await;
    assert_eq!(second.id().await, "2");
    let mut third = hub.connect("third").await;
    assert_eq!(third.id().await, "3");

    hub.stop().await;
}

#[tokio::test]
async fn test_concurrent_senders_to_one_destination() {
    const SENDERS: usize = 5;
    const MESSAGES: usize = 20;

    let hub = TestHub::start().await;
    let mut receiver = hub.connect("receiver").await;

    let mut senders = Vec::new();
    for i in 0..SENDERS {
        senders.push(hub.connect(&format!("sender-{i}")).await);
    }

    let mut tasks = Vec::new();
    for mut sender in senders {
        tasks.push(tokio::spawn(async move {
            for n in 0..MESSAGES {
                sender.send(&format!("s 1 msg-{n}")).await;
            }
            for _ in 0..MESSAGES {
                sender.expect("Sent to 1 client").await;
            }
            sender
        }));
    }

    // Per sender, messages must arrive whole and in the order they were sent.
    let mut next_expected = vec![0usize; SENDERS];
    for _ in 0..SENDERS * MESSAGES {
        let line = receiver.next().await.expect("receiver closed");
        let rest = line.strip_prefix("Message from ").expect("not a direct message");
        let (from, body) = rest.split_once(": ").expect("malformed line");
        let sender_index = from.parse::<usize>().unwrap() - 2;
        assert_eq!(body, format!("msg-{}", next_expected[sender_index]));
        next_expected[sender_index] += 1;
    }
    assert!(next_expected.iter().all(|&n| n == MESSAGES));

    for task in tasks {
        task.await.unwrap();
    }
    hub.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_every_client() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;
    let mut bob = hub.connect("bob").await;

    hub.hub.shutdown().await;
    assert_eq!(hub.hub.session_count(), 0);

    for client in [&mut alice, &mut bob] {
        client.expect(SHUTDOWN_LINE).await;
        client.expect_closed().await;
    }

    let result = tokio::time::timeout(Duration::from_secs(5), hub.serving)
        .await
        .expect("serve did not return after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_caller_signal_shuts_hub_down() {
    let hub = TestHub::start().await;
    let mut alice = hub.connect("alice").await;
    let handle = hub.hub.clone();

    hub.stop().await;
    assert_eq!(handle.session_count(), 0);

    alice.expect(SHUTDOWN_LINE).await;
    alice.expect_closed().await;
}

#[tokio::test]
async fn test_line_too_long_is_rejected_and_session_survives() {
    let hub = TestHub::start_with(HubConfig {
        read_timeout_secs: 1,
        shutdown_grace_secs: 2,
        max_line_length: 16,
        ..HubConfig::default()
    })
    .await;
    let mut alice = hub.connect("alice").await;

    alice.send(&"x".repeat(100)).await;
    alice.expect("Error in command: Line too long (max 16 bytes)").await;
    assert_eq!(alice.id().await, "1");

    hub.stop().await;
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let token = CancellationToken::new();
    let hub = Hub::new(HubConfig::default(), &token);
    let err = hub.start(&addr).await.unwrap_err();

    assert!(matches!(err, HubError::Bind { .. }), "got {err:?}");
    assert!(err.to_string().contains(&addr));
    assert_eq!(hub.session_count(), 0);
}

#[tokio::test]
async fn test_invalid_address_is_a_bind_failure() {
    let token = CancellationToken::new();
    let hub = Hub::new(HubConfig::default(), &token);
    let err = hub.start("not an address").await.unwrap_err();
    assert!(matches!(err, HubError::Bind { .. }), "got {err:?}");
}
