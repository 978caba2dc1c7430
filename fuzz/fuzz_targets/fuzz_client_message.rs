#![no_main]

use libfuzzer_sys::fuzz_target;
use quickchat_client::protocol::ClientMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) {
        let _ = msg.name();
        let _ = serde_json::to_vec(&msg);
    }
});
