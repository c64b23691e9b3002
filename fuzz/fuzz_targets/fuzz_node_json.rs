#![no_main]

use cadgraph_core::prelude::*;
use cadgraph_core::JsonNodeSerializer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let doc = Document::new("fuzz", DocumentConfig::default());
    match JsonNodeSerializer.from_json_string(&doc, text) {
        Ok(id) => {
            // Whatever was accepted must serialize again.
            let again = JsonNodeSerializer.to_json_string(&doc, id).expect("re-serialize");
            let copy = JsonNodeSerializer.from_json_string(&doc, &again).expect("re-parse");
            assert_eq!(doc.kind(copy), doc.kind(id));
        }
        Err(_) => {}
    }
});
