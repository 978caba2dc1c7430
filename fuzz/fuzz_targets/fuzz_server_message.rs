#![no_main]

use libfuzzer_sys::fuzz_target;
use quickchat_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Raw bytes go through serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(s) {
            // Anything accepted must serialize back and parse to the same event.
            let json = serde_json::to_string(&msg).unwrap_or_default();
            if let Ok(again) = serde_json::from_str::<ServerMessage>(&json) {
                assert_eq!(msg, again);
            }
        }
    }
});
