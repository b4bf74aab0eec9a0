mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{container_event, MockDockerClient};
use reverse_proxy_sync::docker::{ConnectionSupervisor, Endpoint, ProxyEvent, SupervisorState};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// 다이얼만 받아주는 로컬 엔드포인트
async fn local_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    Endpoint::Tcp(addr.to_string())
}

async fn next_event(rx: &mut mpsc::Receiver<ProxyEvent>) -> ProxyEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("이벤트 대기 시간 초과")
        .expect("이벤트 채널 종료")
}

#[tokio::test]
async fn test_reconnects_after_failure_and_stream_end() {
    let client = Arc::new(MockDockerClient::new());
    client.fail_next_pings(2);
    client.push_event(container_event("c1", "start"));

    let supervisor = ConnectionSupervisor::new(client.clone(), local_endpoint().await, Duration::from_millis(10));
    let (tx, mut rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { supervisor.run(tx, shutdown_rx).await });

    assert_eq!(next_event(&mut rx).await, ProxyEvent::EngineStart);
    assert!(matches!(next_event(&mut rx).await, ProxyEvent::Container { ref id, ref action, .. } if id == "c1" && action == "start"));
    // 스트림이 끝나면 다시 연결하고 전체 재구성을 요청
    assert_eq!(next_event(&mut rx).await, ProxyEvent::EngineStart);
    assert!(client.pings() >= 4);

    shutdown_tx.send(true).unwrap();
    let mut stopped = false;
    while let Ok(Some(event)) = timeout(Duration::from_secs(5), rx.recv()).await {
        if event == ProxyEvent::EngineStop {
            stopped = true;
        }
    }
    assert!(stopped);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_failed_pings_wait_reconnect_interval() {
    let interval = Duration::from_millis(200);
    let client = Arc::new(MockDockerClient::new());
    client.fail_next_pings(3);

    let supervisor = ConnectionSupervisor::new(client.clone(), local_endpoint().await, interval);
    let (tx, mut rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { supervisor.run(tx, shutdown_rx).await });

    // 엔드포인트 다이얼은 바로 성공하므로 ping 사이 간격은 대기 시간이 만듭니다
    assert_eq!(next_event(&mut rx).await, ProxyEvent::EngineStart);
    // 실패 3번과 성공 1번. 이후 스트림 종료로 인한 재연결 ping은 보지 않음
    let times = client.ping_times();
    assert!(times.len() >= 4);
    for pair in times[..4].windows(2) {
        assert!(pair[1] - pair[0] >= interval, "ping 간격 {:?}", pair[1] - pair[0]);
    }

    shutdown_tx.send(true).unwrap();
    while rx.recv().await.is_some() {}
    handle.await.unwrap();
}

#[tokio::test]
async fn test_state_is_disconnected_after_shutdown() {
    let client = Arc::new(MockDockerClient::new());
    let supervisor = Arc::new(ConnectionSupervisor::new(
        client,
        local_endpoint().await,
        Duration::from_millis(10),
    ));
    let state = supervisor.state();

    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = supervisor.clone();
    let handle = tokio::spawn(async move { runner.run(tx, shutdown_rx).await });

    assert_eq!(next_event(&mut rx).await, ProxyEvent::EngineStart);
    shutdown_tx.send(true).unwrap();
    while rx.recv().await.is_some() {}
    handle.await.unwrap();

    assert_eq!(*state.borrow(), SupervisorState::Disconnected);
}
