// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scenario 5 (spec §8): filter pagination against a scripted XML-RPC
//! simulator speaking the same frame format as a real configuration
//! service, minus TLS.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::net::TcpListener;
use vantage_client::{
    cfg::{config::SessionConfig, enums::Transport},
    config_client::{
        ConfigClient,
        filter::ObjectFilter,
        xmlrpc::{Value, decode_call, encode_return},
    },
};

const TOTAL_BUTTONS: i64 = 137;
const PAGE_SIZE: u32 = 50;

fn button_struct(vid: i64) -> Value {
    Value::Struct(vec![
        ("VID".into(), Value::Int(vid)),
        ("Name".into(), Value::String(format!("Button {vid}"))),
        ("ObjectType".into(), Value::String("Button".into())),
    ])
}

#[tokio::test(flavor = "multi_thread")]
async fn filter_pagination_delivers_every_object_in_bounded_pages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let pages_served = Arc::new(AtomicUsize::new(0));
    let close_observed = Arc::new(AtomicUsize::new(0));
    let served_for_assert = Arc::clone(&pages_served);
    let closed_for_assert = Arc::clone(&close_observed);

    let pages_served_task = Arc::clone(&pages_served);
    let close_observed_task = Arc::clone(&close_observed);
    tokio::spawn(async move {
        use vantage_client::transport::xml_framing::{FrameReader, FrameWriter};
        let pages_served = pages_served_task;
        let close_observed = close_observed_task;

        let (socket, _) = listener.accept().await.expect("accept");
        let (r, w) = tokio::io::split(socket);
        let mut reader = FrameReader::new(r);
        let mut writer = FrameWriter::new(w);

        let mut next_vid: i64 = 1;
        while let Ok(Some(frame)) = reader.read_frame().await {
            let Ok((interface, method, _params)) = decode_call(&frame) else { break };
            let value = match method.as_str() {
                "Login" => Value::Bool(true),
                "OpenFilter" => Value::Int(1),
                "GetFilterResults" => {
                    let remaining = (TOTAL_BUTTONS - next_vid + 1).max(0) as u32;
                    let take = remaining.min(PAGE_SIZE);
                    let items = (0..take)
                        .map(|_| {
                            let v = button_struct(next_vid);
                            next_vid += 1;
                            v
                        })
                        .collect();
                    pages_served.fetch_add(1, Ordering::SeqCst);
                    Value::Array(items)
                },
                "CloseFilter" => {
                    close_observed.fetch_add(1, Ordering::SeqCst);
                    Value::Bool(true)
                },
                _ => Value::Bool(true),
            };
            let reply = encode_return(&interface, &method, Some(&value));
            if writer.write_frame(&reply).await.is_err() {
                break;
            }
        }
    });

    let cfg = SessionConfig::builder("127.0.0.1")
        .transport(Transport::Plain)
        .config_port(port)
        .credentials("admin", "hunter2")
        .filter_page_size(PAGE_SIZE)
        .build()
        .expect("valid config");

    let client = ConfigClient::connect(&cfg).await.expect("connect");
    let filter = ObjectFilter::open(Arc::clone(&client), &[], PAGE_SIZE).await.expect("open filter");
    let objects = filter.drain_all().await.expect("drain");

    assert_eq!(objects.len(), TOTAL_BUTTONS as usize);
    assert_eq!(close_observed.load(Ordering::SeqCst), 1);
    // ceil(137 / 50) == 3 pages, the last one short.
    assert_eq!(served_for_assert.load(Ordering::SeqCst), 3);
    let _ = closed_for_assert;
}
