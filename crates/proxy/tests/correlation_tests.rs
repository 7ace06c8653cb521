//! Reply correlation under reordering.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;

use heapscope_ipc::{Payload, WorkerReply, channel_pair};
use heapscope_proxy::RemoteCallProxy;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_later_call_answered_first_resolves_first() {
    let (client, mut worker) = channel_pair();
    let proxy = RemoteCallProxy::new(client.channel);
    let handle = Arc::new(proxy.create_object("Echo").unwrap());
    let _create = worker.requests.recv().await.unwrap();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    for label in ["five", "six"] {
        let handle = Arc::clone(&handle);
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let value: String = handle.call_method("echo", &(label,)).await.unwrap();
            done_tx.send(value).unwrap();
        });
    }

    let mut labels = HashMap::new();
    for _ in 0..2 {
        let request = worker.requests.recv().await.unwrap();
        let (label,): (String,) = request.arguments.decode().unwrap();
        labels.insert(request.call_id, label);
    }
    let mut call_ids: Vec<u64> = labels.keys().copied().collect();
    call_ids.sort_unstable();
    let (earlier, later) = (call_ids[0], call_ids[1]);

    let answer = |call_id: u64| {
        let payload = Payload::encode(&format!("reply to {}", labels[&call_id])).unwrap();
        WorkerReply::result(call_id, Some(payload))
    };

    proxy.handle_reply(answer(later));
    let first = done_rx.recv().await.unwrap();
    assert_eq!(first, format!("reply to {}", labels[&later]));

    proxy.handle_reply(answer(earlier));
    let second = done_rx.recv().await.unwrap();
    assert_eq!(second, format!("reply to {}", labels[&earlier]));
}

#[tokio::test]
async fn test_every_call_gets_its_own_payload_in_any_reply_order() {
    let (client, mut worker) = channel_pair();
    let proxy = RemoteCallProxy::connect(client.channel, client.replies);
    let handle = Arc::new(proxy.create_object("Square").unwrap());
    let _create = worker.requests.recv().await.unwrap();

    let calls: Vec<_> = (0..16u64)
        .map(|n| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                let squared: u64 = handle.call_method("square", &(n,)).await.unwrap();
                (n, squared)
            })
        })
        .collect();

    let mut requests = Vec::new();
    for _ in 0..16 {
        requests.push(worker.requests.recv().await.unwrap());
    }
    // Answer in a scrambled order: odd positions backwards, then even ones.
    let (odd, even): (Vec<_>, Vec<_>) = requests
        .into_iter()
        .enumerate()
        .partition(|(i, _)| i % 2 == 1);
    for (_, request) in odd.into_iter().rev().chain(even) {
        let (n,): (u64,) = request.arguments.decode().unwrap();
        let payload = Payload::encode(&(n * n)).unwrap();
        worker
            .replies
            .send(WorkerReply::result(request.call_id, Some(payload)))
            .unwrap();
    }

    for call in calls {
        let (n, squared) = call.await.unwrap();
        assert_eq!(squared, n * n);
    }
    assert!(proxy.pending_calls().is_empty());
}
