mod common;

use bytes::Bytes;
use common::Harness;
use modwire::{
    args, Address, Args, Operation, Outcome, Remote, RemoteProxy, Reply, RequestChain, RpcError,
    Socket, WireFormat,
};
use serde_json::json;
use std::time::Duration;
use zeromq::{ReqSocket, Socket as _, SocketRecv, SocketSend, ZmqMessage};

#[tokio::test]
async fn test_missing_field_wire_reply() {
    let mut h = Harness::new();
    h.serve("calc", 1, 2).await;

    // Raw wire contract, straight through a REQ socket.
    let mut req = ReqSocket::new();
    req.connect(&h.ctx.endpoint(&Address::rpc("calc"))).await.unwrap();
    req.send(ZmqMessage::from(
        br#"[["get-attribute",["missing_field"],{}]]"#.to_vec(),
    ))
    .await
    .unwrap();
    let reply = req.recv().await.unwrap().into_vec();
    assert_eq!(reply.last(), Some(&Bytes::from_static(br#"{"error":"calc.missing_field"}"#)));

    let calc = RemoteProxy::connect(&h.ctx, "calc");
    match calc.get("missing_field").await {
        Err(RpcError::Remote(e)) => {
            assert_eq!(e.message(), "calc.missing_field");
            assert!(!e.is_truthy());
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    h.shutdown().await;
}

#[tokio::test]
async fn test_set_then_get() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    calc.set("x", 5).await.unwrap();
    let x: i64 = calc.get("x").await.unwrap().into_value().unwrap();
    assert_eq!(x, 5);

    calc.delete("x").await.unwrap();
    assert!(matches!(calc.get("x").await, Err(RpcError::Remote(_))));

    h.shutdown().await;
}

#[tokio::test]
async fn test_proxy_marker_then_invoke_resends_chain() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    let Remote::Handle(add) = calc.get("add").await.unwrap() else {
        panic!("a method is not representable on the wire");
    };
    assert_eq!(add.description(), Some("<method calc.add>"));
    assert_eq!(add.chain().operations(), &[Operation::get("add")]);

    let sum: i64 = add.invoke(args![2, 3]).await.unwrap().into_value().unwrap();
    assert_eq!(sum, 5);

    // The handle is reusable: each call resends get + invoke from the root.
    let sum: i64 = add.invoke(args![10, 20]).await.unwrap().into_value().unwrap();
    assert_eq!(sum, 30);

    h.shutdown().await;
}

#[tokio::test]
async fn test_chain_stops_at_first_failure() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let mut socket = Socket::rpc(&h.ctx, "calc");

    let chain = RequestChain::from(vec![
        Operation::get("memory"),
        Operation::get("forgotten"),
        Operation::set("never", json!(true)),
    ]);
    assert_eq!(
        socket.request(&chain).await.unwrap(),
        Reply::Error("calc.memory.forgotten".into())
    );

    let follow_up = RequestChain::new().then(Operation::get("never"));
    assert_eq!(
        socket.request(&follow_up).await.unwrap(),
        Reply::Error("calc.never".into())
    );

    h.shutdown().await;
}

#[tokio::test]
async fn test_application_error_carries_call_path() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    match calc.call("div", args![1, 0]).await {
        Err(RpcError::Remote(e)) => assert_eq!(e.to_string(), "(error: calc.div(1, 0))"),
        other => panic!("expected remote error, got {:?}", other),
    }
    let q: i64 = calc.call("div", args![9, 3]).await.unwrap().into_value().unwrap();
    assert_eq!(q, 3);

    h.shutdown().await;
}

#[tokio::test]
async fn test_reflection_over_the_wire() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    let names = calc.directory().await.unwrap();
    for expected in ["add", "div", "help", "items", "memory", "precision"] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }

    let Remote::Handle(memory) = calc.get("memory").await.unwrap() else {
        panic!("child objects come back as handles");
    };
    assert_eq!(memory.directory().await.unwrap(), vec!["help", "slots"]);
    let slots: i64 = memory.get("slots").await.unwrap().into_value().unwrap();
    assert_eq!(slots, 4);

    let mut socket = Socket::rpc(&h.ctx, "calc");
    let chain = RequestChain::from(vec![Operation::get("items"), Operation::Length]);
    assert_eq!(socket.request(&chain).await.unwrap(), Reply::Result(json!(3)));

    let help = calc.call("help", Args::new()).await.unwrap();
    assert_eq!(help.value().unwrap()[0], json!(["add", "add(a, b)"]));

    h.shutdown().await;
}

#[tokio::test]
async fn test_outcome_absorbs_after_remote_failure() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    let failed = Outcome::from(calc).get("nothing_here").await;
    let mut current = failed.clone();
    for i in 0..5 {
        current = current.get("a").await;
        current = current.call("b", args![i]).await;
        current = current.delete("c").await;
    }
    assert!(!current.is_truthy());
    assert_eq!(current.error(), failed.error());
    assert_eq!(current.to_string(), "(error: calc.nothing_here)");

    h.shutdown().await;
}

#[tokio::test]
async fn test_burst_grows_pool_and_settles() {
    let mut h = Harness::new();
    let index = h.serve("calc", 1, 2).await;
    let mut status = h.server(index).watch_status();
    tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.ready == 1))
        .await
        .unwrap()
        .unwrap();

    // Separate proxies so both requests are outstanding at once.
    let first = RemoteProxy::connect(&h.ctx, "calc");
    let second = RemoteProxy::connect(&h.ctx, "calc");
    let (a, b) = tokio::join!(
        first.call("echo_after", args![300, "first"]),
        second.call("echo_after", args![300, "second"]),
    );
    assert_eq!(a.unwrap().into_value::<String>().unwrap(), "first");
    assert_eq!(b.unwrap().into_value::<String>().unwrap(), "second");

    let settled = *tokio::time::timeout(
        Duration::from_secs(2),
        status.wait_for(|s| s.replies_total == 2 && s.live == 1),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(settled.ready, 1);
    assert_eq!(settled.spawned_total, 2);
    assert_eq!(settled.destroyed_total, 1);
    assert!(settled.is_idle());

    h.shutdown().await;
}

#[tokio::test]
async fn test_pool_never_exceeds_max_workers() {
    let mut h = Harness::new();
    let index = h.serve("calc", 0, 2).await;
    let status = h.server(index).watch_status();

    let proxies: Vec<RemoteProxy> = (0..5).map(|_| RemoteProxy::connect(&h.ctx, "calc")).collect();
    let calls = proxies
        .iter()
        .enumerate()
        .map(|(i, p)| p.call("echo_after", args![100, format!("req-{}", i)]));

    let watcher = {
        let mut status = status.clone();
        tokio::spawn(async move {
            let mut peak = 0;
            while status.changed().await.is_ok() {
                peak = peak.max(status.borrow().live);
            }
            peak
        })
    };

    let results = futures::future::join_all(calls).await;
    for (i, result) in results.into_iter().enumerate() {
        let tag: String = result.unwrap().into_value().unwrap();
        assert_eq!(tag, format!("req-{}", i));
    }

    assert!(h.server(index).status().spawned_total <= 5);
    h.shutdown().await;
    let peak = watcher.await.unwrap();
    assert!(peak <= 2, "peak live workers {}", peak);
}

#[tokio::test]
async fn test_request_timeout_drops_and_recovers() {
    let mut h = Harness::new();
    h.serve("calc", 1, 2).await;
    let mut socket = Socket::rpc(&h.ctx, "calc").with_timeout(Duration::from_millis(100));

    let slow = RequestChain::new().then(Operation::named("echo_after", args![1000, "late"]));
    assert!(matches!(socket.request(&slow).await, Err(RpcError::Timeout)));
    assert!(!socket.is_open());

    let quick = RequestChain::new().then(Operation::named("add", args![1, 1]));
    assert_eq!(socket.request(&quick).await.unwrap(), Reply::Result(json!(2)));

    h.shutdown().await;
}

#[tokio::test]
async fn test_open_socket_stays_open() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");
    calc.open().await.unwrap();

    for i in 0..3 {
        let n: i64 = calc.call("add", args![i, 1]).await.unwrap().into_value().unwrap();
        assert_eq!(n, i + 1);
    }
    calc.close().await;

    h.shutdown().await;
}

#[tokio::test]
async fn test_msgpack_wire_format() {
    let mut h = Harness::with_format(WireFormat::MsgPack);
    h.serve("calc", 1, 1).await;
    let calc = RemoteProxy::connect(&h.ctx, "calc");

    let n: i64 = calc.call("add", args![40, 2]).await.unwrap().into_value().unwrap();
    assert_eq!(n, 42);
    assert!(matches!(calc.get("missing").await, Err(RpcError::Remote(_))));

    h.shutdown().await;
}

#[tokio::test]
async fn test_socket_file_removed_on_shutdown() {
    let mut h = Harness::new();
    h.serve("calc", 1, 1).await;
    let path = h.ctx.path(&Address::rpc("calc"));
    assert!(path.exists());
    let Harness { dir, tasks, .. } = h;
    tasks.shutdown().await;
    assert!(!path.exists());
    drop(dir);
}
