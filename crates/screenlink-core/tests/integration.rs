//! End-to-end tests: two applications on loopback, mock input backends.

use std::time::Duration;

use screenlink_core::{App, AppHandle, Settings};
use screenlink_input::mock::{InjectedCall, MockCapture, MockInjector};
use screenlink_input::RawInputEvent;
use serde_json::json;

fn settings(name: &str) -> Settings {
    Settings {
        screen_name: name.to_string(),
        ..Settings::default()
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_online(handle: &AppHandle, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let online = handle
            .call("get_online_screens", json!([]))
            .await
            .ok()
            .and_then(|v| v.as_array().map(Vec::len))
            .unwrap_or(0);
        if online == count {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} online screens"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

struct Endpoint {
    handle: AppHandle,
    task: tokio::task::JoinHandle<Result<(), screenlink_core::CoreError>>,
}

fn spawn_app(
    name: &str,
    capture: MockCapture,
    injector: MockInjector,
    extra: impl FnOnce(&mut Settings),
) -> Endpoint {
    let mut config = settings(name);
    extra(&mut config);
    let mut app = App::new(config, Box::new(capture), Box::new(injector)).unwrap();
    let handle = app.handle();
    let task = tokio::spawn(async move { app.run().await });
    Endpoint { handle, task }
}

#[tokio::test]
async fn handoff_forwards_input_and_disconnect_returns_focus() {
    let (server_capture, server_feed) = MockCapture::new(1920, 1080);
    let server_capture_handle = server_capture.handle();
    let server_injector = MockInjector::new(1920, 1080);

    let (client_capture, _client_feed) = MockCapture::new(1920, 1080);
    let client_injector = MockInjector::new(1920, 1080);
    let client_injector_handle = client_injector.handle();

    let server = spawn_app("alpha", server_capture, server_injector, |_| {});
    let client = spawn_app("beta", client_capture, client_injector, |_| {});

    let port = free_port();
    server
        .handle
        .execute(&format!("server start --address 127.0.0.1 --port {port}"))
        .await
        .unwrap();
    client
        .handle
        .execute(&format!("client start --address 127.0.0.1 --port {port}"))
        .await
        .unwrap();

    wait_for_online(&server.handle, 1).await;
    assert_eq!(
        server.handle.call("server_status", json!([])).await.unwrap(),
        json!(1)
    );
    assert_eq!(
        client.handle.call("client_status", json!([])).await.unwrap(),
        json!(1)
    );

    // Place beta directly to the right of alpha.
    server
        .handle
        .execute("screen --src beta --pos 1920.0")
        .await
        .unwrap();

    // Drive the physical cursor into the right edge: passive border hit,
    // handoff to beta, exclusive capture engages.
    server_feed
        .send(RawInputEvent::MotionAbsolute {
            x: 1919,
            y: 500,
            timestamp: 1,
        })
        .await
        .unwrap();
    wait_for("exclusive capture", || server_capture_handle.is_grabbed()).await;

    // Relative motion now lands on beta as absolute positions.
    server_feed
        .send(RawInputEvent::MotionRelative {
            dx: 25,
            dy: 0,
            timestamp: 2,
        })
        .await
        .unwrap();
    wait_for("absolute motion on the client", || {
        client_injector_handle
            .calls()
            .contains(&InjectedCall::MoveAbsolute { x: 25, y: 500 })
    })
    .await;

    // Keys follow the same path through the scancode table.
    server_feed
        .send(RawInputEvent::Key {
            scancode: 0x1E,
            pressed: true,
            modifiers: screenlink_types::Modifiers::empty(),
            timestamp: 3,
        })
        .await
        .unwrap();
    wait_for("key on the client", || {
        client_injector_handle.calls().iter().any(|call| {
            matches!(
                call,
                InjectedCall::Key {
                    key: screenlink_types::KeyCode::KeyA,
                    state: screenlink_types::KeyState::Down
                }
            )
        })
    })
    .await;

    // Disconnect while focused: focus returns home and capture releases.
    client.handle.execute("client stop").await.unwrap();
    wait_for("capture release", || !server_capture_handle.is_grabbed()).await;
    wait_for_online(&server.handle, 0).await;

    server.handle.shutdown();
    client.handle.shutdown();
    server.task.await.unwrap().unwrap();
    client.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rpc_surface_answers_over_tcp() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let rpc_port = free_port();
    let (capture, _feed) = MockCapture::new(1280, 720);
    let injector = MockInjector::new(1280, 720);
    let app = spawn_app("gamma", capture, injector, |settings| {
        settings.remote_controller = Some(format!("127.0.0.1:{rpc_port}"));
    });

    // The RPC listener comes up with the app.
    let mut stream = None;
    for _ in 0..100 {
        match tokio::net::TcpStream::connect(("127.0.0.1", rpc_port)).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let stream = stream.expect("rpc endpoint never came up");
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"execute_command\",\"params\":[\"version\"]}\n")
        .await
        .unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(reply["result"].as_str().unwrap().contains("screenlink"));

    write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"local_screen_info\"}\n")
        .await
        .unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["result"]["name"], json!("gamma"));
    assert_eq!(reply["result"]["width"], json!(1280));

    write
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"no_such_method\"}\n")
        .await
        .unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown method"));

    app.handle.shutdown();
    app.task.await.unwrap().unwrap();
}
