#![no_main]

use cadgraph_core::prelude::*;
use libfuzzer_sys::fuzz_target;

const CONTAINERS: usize = 4;
const LEAVES: usize = 6;

fuzz_target!(|data: &[u8]| {
    let doc = Document::new("fuzz", DocumentConfig::default().with_history_capacity(16));
    let mut nodes = vec![doc.root_node().expect("root")];
    for i in 1..CONTAINERS {
        nodes.push(doc.create_folder(&format!("f{i}")));
    }
    for i in 0..LEAVES {
        nodes.push(doc.create_visual(&format!("l{i}")));
    }
    let node = |b: u8| nodes[b as usize % nodes.len()];
    let container = |b: u8| nodes[b as usize % CONTAINERS];
    let maybe = |b: u8| (b & 0x80 != 0).then(|| node(b));

    for chunk in data.chunks_exact(4) {
        let [op, a, b, c] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        // Structural errors are fine; panics and broken links are not.
        let _ = match op % 8 {
            0 => doc.add(container(a), &[node(b)]),
            1 => doc.remove(container(a), &[node(b)]),
            2 => doc.transfer(container(a), &[node(b)]),
            3 => doc.insert_before(container(a), maybe(c), node(b)),
            4 => doc.insert_after(container(a), maybe(c), node(b)),
            5 => doc.move_node(node(b), container(a), maybe(c)),
            6 => doc.history().undo(&doc).map(|_| ()),
            _ => doc.history().redo(&doc).map(|_| ()),
        };
    }

    for &parent in &nodes[..CONTAINERS] {
        if !doc.contains(parent) {
            continue;
        }
        let children = doc.children(parent);
        assert_eq!(doc.count(parent), Some(children.len()), "count drifted");
        for child in children {
            assert_eq!(doc.parent(child), Some(parent), "parent link broken");
        }
    }
    doc.dispose();
});
