mod common;

use common::*;
use opentdf_stream::WriterSession;
use std::sync::Barrier;
use std::thread;

static SESSION: WriterSession = WriterSession::new();

#[test]
fn test_one_writer_at_a_time_across_threads() {
    init_tracing();
    let barrier = Barrier::new(4);

    let outcomes: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    match SESSION.begin(WriterConfig::new().kas(rsa_kas())) {
                        Ok(()) => true,
                        Err(TdfError::SessionBusy) => false,
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);

    SESSION.write(b"shared ").unwrap();
    SESSION.write(b"handle").unwrap();
    let bytes = SESSION.finish().unwrap();

    let (payload, manifest) = open_tdf(&bytes);
    assert_eq!(manifest, SESSION.last_manifest().unwrap().unwrap());
    let key = unwrap_share(&manifest.key_access()[0], RSA_PRIVATE_PEM, None);
    assert_eq!(decrypt_payload(&payload, &manifest, &key), b"shared handle");

    SESSION.begin(WriterConfig::new().kas(rsa_kas())).unwrap();
    let (payload, manifest) = open_tdf(&SESSION.finish().unwrap());
    assert!(payload.is_empty());
    assert!(manifest.segments().is_empty());
}
