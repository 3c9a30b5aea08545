//! One extension's contexts talking to each other over a simulated host

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use courier::{
    Channel, Courier, CourierConfig, CourierError, DestinationOptions, ErrorCode, SenderMetadata,
    memory::{EXTENSION_ID, MemoryHost},
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
use wasm_bindgen_test::wasm_bindgen_test;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Highlight {
    selector: String,
    color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Highlighted {
    matches: u32,
    process_id: Option<i64>,
}

struct Extension {
    host: MemoryHost,
    background: Courier,
    popup: Courier,
    script: Courier,
    peer: Courier,
}

fn extension() -> Extension {
    let host = MemoryHost::new();
    let context = |label: &str, transport: courier::memory::MemoryTransport| {
        Courier::with_config(
            Some(Arc::new(transport)),
            CourierConfig::default().with_label(label),
        )
    };

    Extension {
        background: context("background", host.background()),
        popup: context("popup", host.page(1)),
        script: context("content-script", host.content_script(7, 1)),
        peer: context("companion", host.external_peer("companion")),
        host,
    }
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
async fn it_relays_a_popup_request_through_the_background() -> anyhow::Result<()> {
    let Extension {
        host,
        background,
        popup,
        script,
        ..
    } = extension();

    let highlight: Channel<Highlight, Highlighted> = script.channel("page/highlight");
    let _script = highlight.on_message_sync(|request: Highlight, _| {
        Ok::<_, String>(Highlighted {
            matches: request.selector.len() as u32,
            process_id: Some(7),
        })
    });

    let relay: Channel<Highlight, Highlighted> = background.channel("relay/highlight");
    let forward = background.channel::<Highlight, Highlighted>("page/highlight");
    let _background = relay.on_message(move |request: Highlight, _| {
        let forward = forward.clone();
        async move {
            forward
                .send_with(request, DestinationOptions::new().to_process(7))
                .await
                .map_err(|error| error.to_string())?
                .ok_or_else(|| "The content script did not reply".to_owned())
        }
    });

    let relay: Channel<Highlight, Highlighted> = popup.channel("relay/highlight");
    let reply = relay
        .send(Highlight {
            selector: "h1".into(),
            color: "yellow".into(),
        })
        .await?;

    assert_eq!(
        reply,
        Some(Highlighted {
            matches: 2,
            process_id: Some(7)
        })
    );
    assert_eq!(host.request_count(), 2);
    assert_eq!(host.max_responses(), 1);
    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
async fn it_tells_handlers_who_sent_the_envelope() -> anyhow::Result<()> {
    let Extension {
        background, script, ..
    } = extension();

    let whoami: Channel<(), SenderMetadata> = background.channel("whoami");
    let _registration = whoami.on_message_sync(|_: (), sender: SenderMetadata| Ok::<_, String>(sender));

    let whoami: Channel<(), SenderMetadata> = script.channel("whoami");
    let sender = whoami.send(()).await?;

    assert_eq!(sender.as_ref().and_then(|sender| sender.process_id), Some(7));
    assert_eq!(
        sender.and_then(|sender| sender.extension_id),
        Some(EXTENSION_ID.to_owned())
    );
    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
async fn it_lets_an_external_peer_reach_the_extension() -> anyhow::Result<()> {
    let Extension {
        background, peer, ..
    } = extension();
    let visits = Arc::new(AtomicU32::new(0));

    let counter = visits.clone();
    let visit: Channel<String, u32> = background.channel("peer/visit");
    let _registration = visit.on_message(move |_: String, sender: SenderMetadata| {
        let counter = counter.clone();
        async move {
            if sender.extension_id.as_deref() != Some("companion") {
                return Err("unknown peer".to_owned());
            }
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        }
    });

    let visit = peer.external_channel::<String, u32>("peer/visit");
    assert_eq!(visit.send(EXTENSION_ID, "/home".into()).await?, Some(1));
    assert_eq!(visit.send(EXTENSION_ID, "/about".into()).await?, Some(2));

    let error = visit.channel().send("/broadcast".into()).await.err();
    assert_eq!(
        error.and_then(|error| error.code()),
        Some(ErrorCode::NoReceiver)
    );
    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
async fn it_filters_background_handlers_by_the_focused_scope() -> anyhow::Result<()> {
    let Extension {
        host,
        background,
        popup,
        ..
    } = extension();
    host.focus(2);

    let status: Channel<(), String> = background.channel("window/status");
    let _registration = status.on_message_sync(|_: (), _| Ok::<_, String>("focused".to_owned()));

    let status: Channel<(), String> = popup.channel("window/status");
    assert_eq!(
        status
            .send_with((), DestinationOptions::new().in_scope(2))
            .await?,
        Some("focused".to_owned())
    );
    assert_eq!(
        status
            .send_with((), DestinationOptions::new().in_scope(3))
            .await?,
        None
    );
    assert_eq!(status.send(()).await?, Some("focused".to_owned()));
    Ok(())
}

#[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
#[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
async fn it_classifies_what_goes_wrong_between_contexts() {
    let Extension {
        host,
        background,
        script,
        ..
    } = extension();
    let _registration = script
        .channel::<(), ()>("page/ping")
        .on_message_sync(|_: (), _| Ok::<_, String>(()));
    let _background = background
        .channel::<(), ()>("page/ping")
        .on_message_sync(|_: (), _| Ok::<_, String>(()));

    let ping: Channel<(), ()> = background.channel("page/ping");
    let to_script = DestinationOptions::new().to_process(7);
    assert!(ping.send_with((), to_script.clone()).await.is_ok());

    host.close_process(7);
    let closed = ping.send_with((), to_script).await.err();
    assert_eq!(
        closed.as_ref().and_then(CourierError::code),
        Some(ErrorCode::TargetUnavailable)
    );
    assert!(
        closed
            .map(|error| error.to_string())
            .unwrap_or_default()
            .starts_with("Failed to deliver \"page/ping\" to process 7:")
    );

    let ping: Channel<(), ()> = script.channel("page/ping");
    let reloaded = MemoryHost::new();
    let stale = reloaded.content_script(8, 1);
    reloaded.invalidate(&stale);
    let stale = Courier::new(Arc::new(stale));
    let invalidated = stale.channel::<(), ()>("page/ping").send(()).await.err();
    assert_eq!(
        invalidated.and_then(|error| error.code()),
        Some(ErrorCode::ContextInvalidated)
    );

    assert!(ping.send(()).await.is_ok());
}
