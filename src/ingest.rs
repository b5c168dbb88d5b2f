//! Key ingestion.
//!
//! Submitted key material is parsed on a reader thread and handed to the
//! store as a queue of [`KeyEvent`]s. The store consumes the queue in order,
//! one key at a time: a key whose fingerprint is already stored is merged
//! into the stored record, any other key is inserted.
//!
//! The reader splits the packet stream at each primary key packet and builds
//! every key from its own packets, so a damaged key cannot hide the complete
//! keys before it. The queue is FIFO with a single producer, and the
//! producer stops at the first parse error. Every key parsed before an error is therefore stored
//! before that error is returned, and nothing after it is read. Ingestion is
//! not transactional across keys: records written before a failure stay.
//!
//! # Example
//!
//! ```no_run
//! use keydir::{KeyStore, StoreConfig};
//!
//! let store = KeyStore::open(&StoreConfig::new("keys.db")).unwrap();
//!
//! // One armored block
//! store.add_key(&std::fs::read_to_string("alice.asc").unwrap()).unwrap();
//!
//! // A binary keyring dump
//! let file = std::fs::File::open("dump.pgp").unwrap();
//! let summary = store.load_keys(file).unwrap();
//! println!("{} inserted, {} merged", summary.inserted, summary.merged);
//! ```

use std::io::{BufRead, BufReader, Cursor, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use pgp::armor::Dearmor;
use pgp::composed::{Deserializable, SignedPublicKey};
use pgp::packet::{Packet, PacketParser};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::keystore::KeyStore;
use crate::merge::merge_keys;
use crate::resolve::KeyQuery;
use crate::types::KeyRecord;

/// Bound on parsed keys waiting to be stored.
pub const KEY_QUEUE_CAPACITY: usize = 64;

/// One item produced by the key reader.
#[derive(Debug)]
pub enum KeyEvent {
    /// A parsed key
    Key(KeyRecord),
    /// The input is exhausted
    Done,
    /// Parsing failed; no further events follow
    Failed(Error),
}

/// Counts of what a load did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Keys stored as new records
    pub inserted: usize,
    /// Keys merged into existing records
    pub merged: usize,
}

/// Start parsing `reader` as a sequence of binary or armored public keys.
///
/// Parsing runs on its own thread and reads the input as it goes, so no
/// more than [`KEY_QUEUE_CAPACITY`] parsed keys are held ahead of the
/// consumer. Events arrive on the returned queue in input order, ending
/// with exactly one `Done` or `Failed`. If the receiver is dropped the
/// reader thread stops at its next send.
pub fn read_keys<R: Read + Send + 'static>(reader: R) -> Receiver<KeyEvent> {
    let (tx, rx) = mpsc::sync_channel(KEY_QUEUE_CAPACITY);
    thread::spawn(move || produce_keys(reader, &tx));
    rx
}

fn produce_keys<R: Read>(reader: R, tx: &SyncSender<KeyEvent>) {
    let mut source = BufReader::new(reader);
    let armored = match source.fill_buf() {
        Ok(head) => is_armored(head),
        Err(e) => {
            let _ = tx.send(KeyEvent::Failed(e.into()));
            return;
        }
    };

    if armored {
        produce_from_packets(BufReader::new(Dearmor::new(source)), tx);
    } else {
        produce_from_packets(source, tx);
    }
}

fn is_armored(head: &[u8]) -> bool {
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    head[start..].starts_with(b"-----BEGIN PGP")
}

/// Split the packet stream at each primary key packet and build one key per
/// group, so a broken key never takes the complete key before it down.
fn produce_from_packets<B: BufRead>(source: B, tx: &SyncSender<KeyEvent>) {
    let mut pending: Vec<Packet> = Vec::new();

    for packet in PacketParser::new(source) {
        match packet {
            Ok(packet @ Packet::PublicKey(_)) => {
                if !pending.is_empty() && !send_key(tx, std::mem::take(&mut pending)) {
                    return;
                }
                pending.push(packet);
            }
            Ok(Packet::Marker(_)) if pending.is_empty() => {}
            Ok(_) if pending.is_empty() => {
                let _ = tx.send(KeyEvent::Failed(Error::Parse(
                    "packet stream does not start with a public key".to_string(),
                )));
                return;
            }
            Ok(packet) => pending.push(packet),
            Err(e) => {
                // Every packet read so far belongs to the key before the break
                if !pending.is_empty() && !send_key(tx, pending) {
                    return;
                }
                let _ = tx.send(KeyEvent::Failed(Error::Parse(e.to_string())));
                return;
            }
        }
    }

    if !pending.is_empty() && !send_key(tx, pending) {
        return;
    }
    let _ = tx.send(KeyEvent::Done);
}

/// Build a key from its packets and queue it. Returns whether the producer
/// should keep going.
fn send_key(tx: &SyncSender<KeyEvent>, packets: Vec<Packet>) -> bool {
    match build_key(packets) {
        // A send error means the consumer gave up
        Ok(record) => tx.send(KeyEvent::Key(record)).is_ok(),
        Err(e) => {
            let _ = tx.send(KeyEvent::Failed(e));
            false
        }
    }
}

fn build_key(packets: Vec<Packet>) -> Result<KeyRecord> {
    let packets = packets
        .into_iter()
        .map(Ok::<Packet, pgp::errors::Error>)
        .peekable();

    match SignedPublicKey::from_packets(packets).next() {
        Some(key) => KeyRecord::from_public_key(key.map_err(|e| Error::Parse(e.to_string()))?),
        None => Err(Error::Parse("packet group holds no public key".to_string())),
    }
}

/// Strip the ASCII armor from a key block.
fn dearmor(armored: &str) -> Result<Vec<u8>> {
    let mut dearmor = Dearmor::new(Cursor::new(armored.as_bytes()));
    let mut body = Vec::new();
    dearmor
        .read_to_end(&mut body)
        .map_err(|e| Error::MalformedArmor(e.to_string()))?;

    if body.is_empty() {
        return Err(Error::MalformedArmor("armor block has no content".to_string()));
    }

    Ok(body)
}

/// What happened to one incoming key.
enum Applied {
    Inserted,
    Merged,
}

impl KeyStore {
    /// Add keys from an ASCII-armored block.
    ///
    /// # Errors
    /// Returns `Error::MalformedArmor` if the armor cannot be decoded, and
    /// otherwise whatever [`load_keys`](Self::load_keys) returns.
    #[tracing::instrument(skip_all)]
    pub fn add_key(&self, armored: &str) -> Result<LoadSummary> {
        debug!("AddKey");
        let body = dearmor(armored)?;
        self.load_keys(Cursor::new(body))
    }

    /// Add every key in a stream of OpenPGP data.
    ///
    /// Each key is merged into the stored record with the same fingerprint,
    /// or inserted if there is none.
    ///
    /// # Errors
    /// Stops at the first parse or storage error and returns it. Keys
    /// already stored stay stored. A key inserted concurrently by another
    /// session surfaces as `Error::DuplicateKey`.
    #[tracing::instrument(skip_all)]
    pub fn load_keys<R: Read + Send + 'static>(&self, reader: R) -> Result<LoadSummary> {
        self.apply_events(read_keys(reader))
    }

    /// Consume a key event queue until it ends.
    ///
    /// This is the consumer half of [`load_keys`](Self::load_keys), exposed
    /// so callers with their own parser can feed it.
    pub fn apply_events(&self, events: Receiver<KeyEvent>) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();

        loop {
            match events.recv() {
                Ok(KeyEvent::Key(record)) => match self.merge_or_insert(record)? {
                    Applied::Inserted => summary.inserted += 1,
                    Applied::Merged => summary.merged += 1,
                },
                Ok(KeyEvent::Done) => {
                    info!(
                        inserted = summary.inserted,
                        merged = summary.merged,
                        "Keys loaded"
                    );
                    return Ok(summary);
                }
                Ok(KeyEvent::Failed(e)) => {
                    warn!(
                        error = %e,
                        inserted = summary.inserted,
                        merged = summary.merged,
                        "Key stream failed"
                    );
                    return Err(e);
                }
                Err(mpsc::RecvError) => {
                    return Err(Error::Parse(
                        "key reader stopped before end of input".to_string(),
                    ));
                }
            }
        }
    }

    fn merge_or_insert(&self, record: KeyRecord) -> Result<Applied> {
        match self.find_key(&KeyQuery::fingerprint(&record.fingerprint)) {
            Ok(existing) => {
                debug!(fingerprint = %record.fingerprint, "Merge/Update");
                let merged = merge_keys(&existing, &record)?;
                self.replace_key(&merged)?;
                Ok(Applied::Merged)
            }
            Err(Error::KeyNotFound(_)) => {
                debug!(fingerprint = %record.fingerprint, "Insert");
                self.insert_key(&record)?;
                Ok(Applied::Inserted)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{generate_key, key_armored, key_bytes, keyring_bytes, record};

    fn collect(rx: Receiver<KeyEvent>) -> Vec<KeyEvent> {
        rx.into_iter().collect()
    }

    #[test]
    fn test_read_keys_keyring() {
        let alice = generate_key(&["Alice <alice@example.com>"]);
        let bob = generate_key(&["Bob <bob@example.com>"]);

        let events = collect(read_keys(Cursor::new(keyring_bytes(&[&alice, &bob]))));
        assert_eq!(events.len(), 3);
        match (&events[0], &events[1], &events[2]) {
            (KeyEvent::Key(a), KeyEvent::Key(b), KeyEvent::Done) => {
                assert_eq!(a.fingerprint, record(alice).fingerprint);
                assert_eq!(b.fingerprint, record(bob).fingerprint);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_read_keys_empty_input() {
        let events = collect(read_keys(Cursor::new(Vec::new())));
        assert!(matches!(events.as_slice(), [KeyEvent::Done]));
    }

    #[test]
    fn test_read_keys_garbage_fails() {
        let events = collect(read_keys(Cursor::new(b"definitely not openpgp".to_vec())));
        assert!(
            matches!(events.as_slice(), [KeyEvent::Failed(Error::Parse(_))]),
            "unexpected events: {:?}",
            events
        );
    }

    #[test]
    fn test_read_keys_truncated_second_key() {
        let alice = generate_key(&["Alice <alice@example.com>"]);
        let bob = generate_key(&["Bob <bob@example.com>"]);

        let mut data = key_bytes(&alice);
        data.extend_from_slice(&key_bytes(&bob)[..20]);

        let events = collect(read_keys(Cursor::new(data)));
        match events.as_slice() {
            [KeyEvent::Key(a), KeyEvent::Failed(Error::Parse(_))] => {
                assert_eq!(a.fingerprint, record(alice).fingerprint);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_read_keys_armored() {
        let alice = generate_key(&["Alice <alice@example.com>"]);

        let events = collect(read_keys(Cursor::new(key_armored(&alice).into_bytes())));
        match events.as_slice() {
            [KeyEvent::Key(a), KeyEvent::Done] => {
                assert_eq!(a.fingerprint, record(alice).fingerprint);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_is_armored() {
        assert!(is_armored(b"-----BEGIN PGP PUBLIC KEY BLOCK-----\n"));
        assert!(is_armored(b"\n  -----BEGIN PGP PUBLIC KEY BLOCK-----\n"));
        assert!(!is_armored(b"\x99\x00\x33"));
        assert!(!is_armored(b""));
    }

    #[test]
    fn test_dearmor() {
        let key = generate_key(&["Alice <alice@example.com>"]);
        let body = dearmor(&key_armored(&key)).unwrap();
        assert_eq!(body, key_bytes(&key));
    }

    #[test]
    fn test_dearmor_malformed() {
        assert!(matches!(
            dearmor("-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n!!!!\n"),
            Err(Error::MalformedArmor(_))
        ));
        assert!(matches!(dearmor(""), Err(Error::MalformedArmor(_))));
    }

    #[test]
    fn test_apply_events_stops_at_failure() {
        let store = KeyStore::open_in_memory().unwrap();
        let alice = record(generate_key(&["Alice <alice@example.com>"]));
        let bob = record(generate_key(&["Bob <bob@example.com>"]));
        let bob_fp = bob.fingerprint.clone();

        let (tx, rx) = mpsc::sync_channel(KEY_QUEUE_CAPACITY);
        tx.send(KeyEvent::Key(alice.clone())).unwrap();
        tx.send(KeyEvent::Failed(Error::Parse("bad packet".to_string())))
            .unwrap();
        tx.send(KeyEvent::Key(bob)).unwrap();
        drop(tx);

        let result = store.apply_events(rx);
        assert!(matches!(result, Err(Error::Parse(_))));

        // Keys before the error are kept, keys after it are never read
        assert!(store.contains(&alice.fingerprint).unwrap());
        assert!(!store.contains(&bob_fp).unwrap());
    }

    #[test]
    fn test_apply_events_reader_vanished() {
        let store = KeyStore::open_in_memory().unwrap();
        let (tx, rx) = mpsc::sync_channel::<KeyEvent>(1);
        drop(tx);

        assert!(matches!(store.apply_events(rx), Err(Error::Parse(_))));
    }

    #[test]
    fn test_apply_events_counts() {
        let store = KeyStore::open_in_memory().unwrap();
        let alice = record(generate_key(&["Alice <alice@example.com>"]));

        let (tx, rx) = mpsc::sync_channel(KEY_QUEUE_CAPACITY);
        tx.send(KeyEvent::Key(alice.clone())).unwrap();
        tx.send(KeyEvent::Key(alice)).unwrap();
        tx.send(KeyEvent::Done).unwrap();

        let summary = store.apply_events(rx).unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                inserted: 1,
                merged: 1
            }
        );
        assert_eq!(store.count().unwrap(), 1);
    }
}
