#![cfg(all(target_arch = "wasm32", target_os = "unknown"))]

//! The WebExtension binding against scripted stand-ins for the host API

use courier::{Channel, CourierConfig, CourierError, ErrorCode, NamespacePreference, Transport};
use courier_web::{Namespace, WebExtensionTransport, connect};
use js_sys::{Function, JSON, Reflect};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::wasm_bindgen_test;

wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_dedicated_worker);

fn script(body: &str) -> anyhow::Result<JsValue> {
    Function::new_no_args(body)
        .call0(&JsValue::UNDEFINED)
        .map_err(|error| anyhow::anyhow!("{error:?}"))
}

fn reset() -> anyhow::Result<()> {
    script(
        "delete globalThis.chrome;
         delete globalThis.browser;
         globalThis.courierListeners = [];
         globalThis.courierReply = undefined;",
    )?;
    Ok(())
}

const EVENTS: &str = "{
    addListener(listener) { globalThis.courierListeners.push(listener); },
    removeListener(listener) {
        globalThis.courierListeners = globalThis.courierListeners.filter((l) => l !== listener);
    }
}";

fn global(name: &str) -> anyhow::Result<Value> {
    let value = Reflect::get(&js_sys::global(), &JsValue::from_str(name))
        .map_err(|error| anyhow::anyhow!("{error:?}"))?;
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = JSON::stringify(&value)
        .map_err(|error| anyhow::anyhow!("{error:?}"))?
        .as_string()
        .unwrap_or_default();
    Ok(serde_json::from_str(&text)?)
}

#[wasm_bindgen_test]
async fn it_detaches_without_an_extension_api() -> anyhow::Result<()> {
    reset()?;

    let courier = connect(CourierConfig::default());
    let channel: Channel = courier.channel("ping");

    assert!(!courier.has_transport());
    assert!(matches!(
        channel.send(Value::Null).await,
        Err(CourierError::TransportUnavailable)
    ));
    Ok(())
}

#[wasm_bindgen_test]
async fn it_sends_through_a_promise_style_namespace() -> anyhow::Result<()> {
    reset()?;
    script(&format!(
        "globalThis.browser = {{ runtime: {{
            sendMessage: (message) => Promise.resolve({{ echoed: message.payload, topic: message.topic }}),
            onMessage: {EVENTS}
        }} }};"
    ))?;

    let transport = WebExtensionTransport::detect(NamespacePreference::Auto)
        .ok_or_else(|| anyhow::anyhow!("browser namespace was not detected"))?;
    assert_eq!(transport.namespace(), Namespace::Browser);

    let courier = connect(CourierConfig::default());
    let echo: Channel = courier.channel("echo");
    let reply = echo.send(json!([1, 2, 3])).await?;

    assert_eq!(reply, Some(json!({ "echoed": [1, 2, 3], "topic": "echo" })));
    reset()
}

#[wasm_bindgen_test]
async fn it_reads_last_error_from_a_callback_style_namespace() -> anyhow::Result<()> {
    reset()?;
    script(&format!(
        "globalThis.chrome = {{ runtime: {{
            lastError: undefined,
            sendMessage(message, callback) {{
                this.lastError = {{ message: 'Could not establish connection. Receiving end does not exist.' }};
                callback();
                this.lastError = undefined;
            }},
            onMessage: {EVENTS}
        }} }};"
    ))?;

    let courier = connect(CourierConfig::default());
    let ping: Channel = courier.channel("ping");
    let error = ping.send(Value::Null).await.err();

    assert_eq!(
        error.and_then(|error| error.code()),
        Some(ErrorCode::NoReceiver)
    );
    reset()
}

#[wasm_bindgen_test]
async fn it_answers_host_messages_through_send_response() -> anyhow::Result<()> {
    reset()?;
    script(&format!(
        "globalThis.chrome = {{ runtime: {{
            sendMessage(message, callback) {{ callback(); }},
            onMessage: {EVENTS}
        }} }};"
    ))?;

    let courier = connect(CourierConfig::default());
    let scale: Channel<u32, i64> = courier.channel("scale");
    let registration = scale.on_message_sync(|value: u32, sender: courier::SenderMetadata| {
        Ok::<_, String>(i64::from(value) * 10 + sender.process_id.unwrap_or_default())
    });
    assert_eq!(global("courierListeners")?, json!([null]));

    let kept = script(
        "return globalThis.courierListeners[0](
            { topic: 'scale', payload: 2 },
            { tab: { id: 4 }, frameId: 0 },
            (reply) => { globalThis.courierReply = reply; }
        );",
    )?;
    assert_eq!(kept.as_bool(), Some(true));
    assert_eq!(global("courierReply")?, json!(24));

    let ignored = script(
        "return globalThis.courierListeners[0]({ topic: 'other' }, {}, () => {});",
    )?;
    assert_eq!(ignored.as_bool(), Some(false));

    registration.dispose();
    assert_eq!(global("courierListeners")?, json!([]));
    reset()
}

#[wasm_bindgen_test]
fn it_offers_scope_lookup_only_with_a_windows_api() -> anyhow::Result<()> {
    reset()?;
    script(&format!(
        "globalThis.browser = {{ runtime: {{ sendMessage: () => Promise.resolve(), onMessage: {EVENTS} }} }};"
    ))?;
    let without = WebExtensionTransport::detect(NamespacePreference::Browser)
        .ok_or_else(|| anyhow::anyhow!("browser namespace was not detected"))?;
    assert!(without.scope_lookup().is_none());

    script("globalThis.browser.windows = { getCurrent: () => Promise.resolve({ id: 3 }) };")?;
    let with = WebExtensionTransport::detect(NamespacePreference::Browser)
        .ok_or_else(|| anyhow::anyhow!("browser namespace was not detected"))?;
    assert!(with.scope_lookup().is_some());
    reset()
}
