use std::fs::File;
use std::io::Read;

use swarm_metainfo::Metainfo;

fn main() {
    let mut metainfo_bytes = Vec::new();
    File::open("br.torrent")
        .unwrap()
        .read_to_end(&mut metainfo_bytes)
        .unwrap();

    let metainfo = Metainfo::from_bytes(metainfo_bytes).unwrap();

    for tier in metainfo.trackers() {
        for url in tier {
            println!("{}", url);
        }
    }
}
