//! Pack (version 2) closure collection and encoding.
//!
//! Packs are generated on demand and every entry is a whole, self-contained
//! zlib stream. No deltas: larger than a canonical pack, far simpler to
//! produce from a relational store.

use std::collections::{HashSet, VecDeque};
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha1::{Digest as _, Sha1};

use crate::error::GitError;
use crate::object::{Commit, ObjectType, parse_tree};
use crate::oid::Oid;

/// Read access to stored objects, implemented by the server's store.
pub trait ObjectSource {
    /// Return the object's kind and raw content.
    fn object(&self, oid: &Oid) -> Result<(ObjectType, Vec<u8>), GitError>;
}

/// Breadth-first closure from `wants`: commit → tree and parents, tree →
/// blobs and subtrees. Pruned at `haves`, at already-visited objects, and
/// capped at `cap` objects.
pub fn collect_objects(
    source: &dyn ObjectSource,
    wants: &[Oid],
    haves: &HashSet<Oid>,
    cap: usize,
) -> Result<Vec<Oid>, GitError> {
    let mut visited: HashSet<Oid> = HashSet::new();
    let mut ordered = Vec::new();
    let mut queue: VecDeque<Oid> = wants.iter().copied().collect();

    while let Some(oid) = queue.pop_front() {
        if haves.contains(&oid) || !visited.insert(oid) {
            continue;
        }
        if ordered.len() >= cap {
            return Err(GitError::ClosureTooLarge(cap));
        }
        let (kind, content) = source.object(&oid)?;
        ordered.push(oid);
        match kind {
            ObjectType::Commit => {
                let commit = Commit::parse(&content)?;
                queue.push_back(commit.tree);
                queue.extend(commit.parents);
            }
            ObjectType::Tree => {
                for entry in parse_tree(&content)? {
                    queue.push_back(entry.oid);
                }
            }
            ObjectType::Blob => {}
        }
    }
    Ok(ordered)
}

/// Encode `oids` into a pack: `"PACK"`, version 2, object count, then per
/// object a variable-length type+size header followed by the whole-object
/// zlib payload, and finally a SHA-1 trailer over all preceding bytes.
pub fn encode_pack(source: &dyn ObjectSource, oids: &[Oid]) -> Result<Vec<u8>, GitError> {
    let mut pack = Vec::new();
    pack.extend_from_slice(b"PACK");
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&(oids.len() as u32).to_be_bytes());

    for oid in oids {
        let (kind, content) = source.object(oid)?;
        write_entry_header(&mut pack, kind, content.len());
        let mut encoder =
            ZlibEncoder::new(Vec::with_capacity(content.len()), Compression::default());
        encoder.write_all(&content)?;
        pack.extend_from_slice(&encoder.finish()?);
    }

    let mut hasher = Sha1::new();
    hasher.update(&pack);
    let trailer: [u8; 20] = hasher.finalize().into();
    pack.extend_from_slice(&trailer);
    Ok(pack)
}

// Type in bits 4-6 of the first byte, size packed four bits first and then
// seven at a time low-to-high, MSB flagging continuation.
fn write_entry_header(out: &mut Vec<u8>, kind: ObjectType, size: usize) {
    let mut size = size;
    let mut byte = (kind.pack_code() << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Read;

    use flate2::read::ZlibDecoder;

    use super::*;
    use crate::object::{
        FileMode, Signature, TreeEntry, encode_tree, object_id,
    };

    #[derive(Default)]
    struct MemSource {
        objects: HashMap<Oid, (ObjectType, Vec<u8>)>,
    }

    impl MemSource {
        fn put(&mut self, kind: ObjectType, content: &[u8]) -> Oid {
            let oid = object_id(kind, content);
            self.objects.insert(oid, (kind, content.to_vec()));
            oid
        }
    }

    impl ObjectSource for MemSource {
        fn object(&self, oid: &Oid) -> Result<(ObjectType, Vec<u8>), GitError> {
            self.objects
                .get(oid)
                .cloned()
                .ok_or_else(|| GitError::ObjectNotFound(oid.to_hex()))
        }
    }

    fn sample_repo() -> (MemSource, Oid) {
        let mut src = MemSource::default();
        let blob = src.put(ObjectType::Blob, b"---\nname: demo\n---\n");
        let subtree = src.put(
            ObjectType::Tree,
            &encode_tree(&[TreeEntry {
                mode: FileMode::Regular,
                name: "SKILL.md".into(),
                oid: blob,
            }]),
        );
        let root = src.put(
            ObjectType::Tree,
            &encode_tree(&[TreeEntry {
                mode: FileMode::Directory,
                name: "skills".into(),
                oid: subtree,
            }]),
        );
        let commit = Commit {
            tree: root,
            parents: vec![],
            author: Signature::new("Skillbase", "noreply@skillbase.dev", 0),
            committer: Signature::new("Skillbase", "noreply@skillbase.dev", 0),
            message: "Snapshot\n".into(),
        };
        let commit_id = src.put(ObjectType::Commit, &commit.encode());
        (src, commit_id)
    }

    // Independent reader: parse the header, inflate each entry, check the
    // trailer, and return (kind, content) pairs.
    fn read_pack(bytes: &[u8]) -> Vec<(ObjectType, Vec<u8>)> {
        assert!(bytes.len() > 32);
        assert_eq!(&bytes[..4], b"PACK");
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), 2);
        let count = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;

        let body_end = bytes.len() - 20;
        let mut hasher = Sha1::new();
        hasher.update(&bytes[..body_end]);
        let trailer: [u8; 20] = hasher.finalize().into();
        assert_eq!(&bytes[body_end..], &trailer);

        let mut pos = 12;
        let mut objects = Vec::new();
        for _ in 0..count {
            let first = bytes[pos];
            pos += 1;
            let kind = ObjectType::from_pack_code((first >> 4) & 0x07).unwrap();
            let mut size = (first & 0x0f) as usize;
            let mut shift = 4;
            let mut cont = first & 0x80 != 0;
            while cont {
                let byte = bytes[pos];
                pos += 1;
                size |= ((byte & 0x7f) as usize) << shift;
                shift += 7;
                cont = byte & 0x80 != 0;
            }

            let mut decoder = ZlibDecoder::new(&bytes[pos..body_end]);
            let mut content = Vec::new();
            decoder.read_to_end(&mut content).unwrap();
            assert_eq!(content.len(), size);
            pos += decoder.total_in() as usize;
            objects.push((kind, content));
        }
        assert_eq!(pos, body_end);
        objects
    }

    #[test]
    fn closure_covers_commit_tree_and_blobs() {
        let (src, tip) = sample_repo();
        let oids = collect_objects(&src, &[tip], &HashSet::new(), 1000).unwrap();
        assert_eq!(oids.len(), 4);
        assert_eq!(oids[0], tip);
    }

    #[test]
    fn haves_prune_the_walk() {
        let (src, tip) = sample_repo();
        let all = collect_objects(&src, &[tip], &HashSet::new(), 1000).unwrap();
        // Pretend the client already has the root tree: it and everything
        // below it drop out.
        let haves: HashSet<Oid> = [all[1]].into_iter().collect();
        let pruned = collect_objects(&src, &[tip], &haves, 1000).unwrap();
        assert_eq!(pruned, vec![tip]);
    }

    #[test]
    fn cap_is_enforced() {
        let (src, tip) = sample_repo();
        let err = collect_objects(&src, &[tip], &HashSet::new(), 2).unwrap_err();
        assert!(matches!(err, GitError::ClosureTooLarge(2)));
    }

    #[test]
    fn pack_round_trips_through_independent_reader() {
        let (src, tip) = sample_repo();
        let oids = collect_objects(&src, &[tip], &HashSet::new(), 1000).unwrap();
        let pack = encode_pack(&src, &oids).unwrap();

        let decoded = read_pack(&pack);
        assert_eq!(decoded.len(), oids.len());
        for ((kind, content), oid) in decoded.iter().zip(&oids) {
            assert_eq!(object_id(*kind, content), *oid);
        }
    }

    #[test]
    fn entry_header_encodes_multi_byte_sizes() {
        let mut out = Vec::new();
        write_entry_header(&mut out, ObjectType::Blob, 0x1234);
        // 0x1234: low 4 bits in the first byte, then seven bits per
        // continuation byte.
        assert_eq!(out, vec![0x80 | 0x30 | 0x04, 0x80 | 0x23, 0x02]);
    }
}
