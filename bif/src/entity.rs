//! Common part of every node in an experiment tree
//!
//! An entity has an immutable id, user metadata and a content hash. Its metadata object is a
//! json object that contains the user metadata plus a few reserved keys, which are injected on
//! write and stripped on read.
use crate::{
    archive::{Archive, ArchivePath},
    error::{Error, Result},
    hash::ContentHash,
};
use derive_more::Display;
use maplit::btreemap;
use serde_json::{json, Value};
use std::{collections::BTreeMap, str::FromStr};
use tracing::{trace, warn};
use uuid::Uuid;

/// User metadata of an entity
pub type Metadata = BTreeMap<String, Value>;

/// File name of the metadata object of every entity
pub const METADATA_FILE_NAME: &str = ".metadata";

const UNIQUE_ID: &str = ".uniqueID";
const DATA_HASH: &str = ".dataHash";
const TARGET_HASH: &str = ".targetHash";
const CALCULATED_INFORMATION: &str = ".calculatedInformation";

/// Keys that are managed by the format and never part of user metadata
pub const RESERVED_KEYS: [&str; 4] = [UNIQUE_ID, DATA_HASH, TARGET_HASH, CALCULATED_INFORMATION];

/// Process unique id of an entity. Generated once, never reused.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Uuid);

impl EntityId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Experiment,
    Subject,
    Session,
    Channel,
    Derived,
}

impl EntityKind {
    /// prefix of the path segment of an entity of this kind. The experiment is the root
    /// and has no segment of its own.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Experiment => None,
            Self::Subject => Some("SUBJECT"),
            Self::Session => Some("SESSION"),
            Self::Channel => Some("CHANNEL"),
            Self::Derived => Some("AdditionalData"),
        }
    }

    /// metadata keys every entity of this kind has, with the value used when the caller omits them
    pub fn default_metadata(self) -> Metadata {
        match self {
            Self::Experiment | Self::Session => btreemap! {
                "name".to_owned() => json!(""),
                "description".to_owned() => json!(""),
            },
            Self::Subject => btreemap! {
                "name".to_owned() => json!(""),
                "gender".to_owned() => json!(""),
                "age".to_owned() => json!(-1),
                "description".to_owned() => json!(""),
            },
            Self::Channel => btreemap! {
                "label".to_owned() => json!(""),
                "unit".to_owned() => json!(""),
                "sampling-rate".to_owned() => json!(0.0),
            },
            Self::Derived => Metadata::new(),
        }
    }
}

/// Which reserved key carries the hash of a metadata object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HashKey {
    /// the entity's own content hash
    Data,
    /// the owner hash a derived value was computed for
    Target,
}

impl HashKey {
    fn key(self) -> &'static str {
        match self {
            Self::Data => DATA_HASH,
            Self::Target => TARGET_HASH,
        }
    }
}

/// Content of a metadata object, with the reserved keys split off
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetadata {
    pub metadata: Metadata,
    pub hash: Option<ContentHash>,
    pub calculated: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    metadata: Metadata,
    content_hash: Option<ContentHash>,
}

impl Entity {
    /// Creates an entity with a fresh id. Omitted required keys get their default values.
    pub fn new(kind: EntityKind, metadata: Metadata) -> Self {
        let mut res = Self {
            id: EntityId::generate(),
            kind,
            metadata,
            content_hash: None,
        };
        for key in RESERVED_KEYS.iter() {
            if res.metadata.remove(*key).is_some() {
                warn!("dropping reserved metadata key {}", key);
            }
        }
        res.default_metadata_values();
        res
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub(crate) fn set_content_hash(&mut self, hash: Option<ContentHash>) {
        self.content_hash = hash;
    }

    /// Segment this entity adds to the path of its parent
    pub fn path_segment(&self) -> Option<String> {
        self.kind.prefix().map(|prefix| format!("{}-{}", prefix, self.id))
    }

    /// fills in the keys the entity kind requires but that are missing
    pub fn default_metadata_values(&mut self) {
        for (key, value) in self.kind.default_metadata() {
            self.metadata.entry(key).or_insert(value);
        }
    }

    /// serialized metadata object, keys sorted and indented
    pub(crate) fn encode_metadata(
        &self,
        key: HashKey,
        hash: Option<&ContentHash>,
        calculated: &[String],
    ) -> Result<Vec<u8>> {
        let mut object = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        object.insert(UNIQUE_ID.to_owned(), json!(self.id.to_string()));
        object.insert(key.key().to_owned(), json!(ContentHash::to_stored(hash)));
        if !calculated.is_empty() {
            object.insert(CALCULATED_INFORMATION.to_owned(), json!(calculated));
        }
        Ok(serde_json::to_vec_pretty(&Value::Object(object))?)
    }

    /// parses a metadata object written by `encode_metadata` for this entity
    pub(crate) fn decode_metadata(
        &self,
        path: &ArchivePath,
        key: HashKey,
        data: &[u8],
    ) -> Result<StoredMetadata> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| Error::corrupt(path, format!("malformed json: {}", e)))?;
        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err(Error::corrupt(path, "not a json object")),
        };
        match object.remove(UNIQUE_ID) {
            Some(Value::String(id)) if id == self.id.to_string() => {}
            Some(Value::String(id)) => {
                return Err(Error::corrupt(
                    path,
                    format!("belongs to {}, expected {}", id, self.id),
                ))
            }
            Some(_) => return Err(Error::corrupt(path, "unique id is not a string")),
            None => return Err(Error::corrupt(path, "missing unique id")),
        }
        let hash = match object.remove(key.key()) {
            Some(Value::String(hash)) => ContentHash::from_stored(&hash),
            Some(_) => return Err(Error::corrupt(path, format!("{} is not a string", key.key()))),
            None => return Err(Error::corrupt(path, format!("missing {}", key.key()))),
        };
        let calculated = match object.remove(CALCULATED_INFORMATION) {
            Some(value) => serde_json::from_value::<Vec<String>>(value).map_err(|e| {
                Error::corrupt(path, format!("malformed calculated information: {}", e))
            })?,
            None => Vec::new(),
        };
        // whatever is left of the reserved keys does not belong to the user
        for key in RESERVED_KEYS.iter() {
            object.remove(*key);
        }
        Ok(StoredMetadata {
            metadata: object.into_iter().collect(),
            hash,
            calculated,
        })
    }

    pub(crate) fn write_metadata(
        &self,
        archive: &dyn Archive,
        base: &ArchivePath,
        key: HashKey,
        hash: Option<&ContentHash>,
        calculated: &[String],
    ) -> Result<()> {
        let path = base.join(METADATA_FILE_NAME);
        trace!("writing metadata of {} to {}", self.id, path);
        let data = self.encode_metadata(key, hash, calculated)?;
        archive.add(&path, &data)
    }

    pub(crate) fn read_metadata(
        &self,
        archive: &dyn Archive,
        base: &ArchivePath,
        key: HashKey,
    ) -> Result<StoredMetadata> {
        let path = base.join(METADATA_FILE_NAME);
        let data = archive.read(&path)?;
        self.decode_metadata(&path, key, &data)
    }

    pub(crate) fn remove_metadata(&self, archive: &dyn Archive, base: &ArchivePath) -> Result<()> {
        archive.remove(&base.join(METADATA_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archive::MemArchive, hash::HashAlgorithm};

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn defaults_fill_only_missing_keys() {
        let subject = Entity::new(EntityKind::Subject, meta(&[("name", json!("Subject001"))]));
        assert_eq!(
            subject.metadata(),
            &meta(&[
                ("name", json!("Subject001")),
                ("gender", json!("")),
                ("age", json!(-1)),
                ("description", json!("")),
            ])
        );
        let derived = Entity::new(EntityKind::Derived, Metadata::new());
        assert!(derived.metadata().is_empty());
    }

    #[test]
    fn reserved_keys_are_dropped() {
        let e = Entity::new(
            EntityKind::Experiment,
            meta(&[(".uniqueID", json!("x")), (".dataHash", json!("y")), ("name", json!("n"))]),
        );
        assert!(RESERVED_KEYS.iter().all(|k| !e.metadata().contains_key(*k)));
        assert_eq!(e.metadata()["name"], json!("n"));
    }

    #[test]
    fn path_segments() {
        let e = Entity::new(EntityKind::Experiment, Metadata::new());
        assert_eq!(e.path_segment(), None);
        let c = Entity::new(EntityKind::Channel, Metadata::new());
        assert_eq!(c.path_segment(), Some(format!("CHANNEL-{}", c.id())));
        let d = Entity::new(EntityKind::Derived, Metadata::new());
        assert_eq!(d.path_segment(), Some(format!("AdditionalData-{}", d.id())));
    }

    #[test]
    fn ids_are_unique_and_parse() -> anyhow::Result<()> {
        let a = Entity::new(EntityKind::Session, Metadata::new());
        let b = Entity::new(EntityKind::Session, Metadata::new());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_uuid().get_version_num(), 4);
        assert_eq!(a.id().to_string().parse::<EntityId>()?, a.id());
        Ok(())
    }

    #[test]
    fn metadata_roundtrip() -> anyhow::Result<()> {
        let archive = MemArchive::unbounded();
        let base = ArchivePath::new(vec!["SUBJECT-1"]);
        let e = Entity::new(EntityKind::Experiment, meta(&[("name", json!("Exp!"))]));
        let hash = HashAlgorithm::Sha224.digest(b"x");
        let calculated = vec!["AdditionalData-1".to_owned()];
        e.write_metadata(&archive, &base, HashKey::Data, Some(&hash), &calculated)?;
        let raw: Value = serde_json::from_slice(&archive.read(&base.join(".metadata"))?)?;
        assert_eq!(raw[".uniqueID"], json!(e.id().to_string()));
        assert_eq!(raw[".dataHash"], json!(hash.as_str()));
        let stored = e.read_metadata(&archive, &base, HashKey::Data)?;
        assert_eq!(&stored.metadata, e.metadata());
        assert_eq!(stored.hash, Some(hash));
        assert_eq!(stored.calculated, calculated);
        e.remove_metadata(&archive, &base)?;
        assert!(archive.is_empty());
        Ok(())
    }

    #[test]
    fn missing_hash_is_stored_as_empty_string() -> anyhow::Result<()> {
        let e = Entity::new(EntityKind::Derived, Metadata::new());
        let data = e.encode_metadata(HashKey::Target, None, &[])?;
        let raw: Value = serde_json::from_slice(&data)?;
        assert_eq!(raw[".targetHash"], json!(""));
        assert!(raw.get(".dataHash").is_none());
        assert!(raw.get(".calculatedInformation").is_none());
        let stored = e.decode_metadata(&ArchivePath::root(), HashKey::Target, &data)?;
        assert_eq!(stored.hash, None);
        Ok(())
    }

    #[test]
    fn encoding_is_deterministic() -> anyhow::Result<()> {
        let e = Entity::new(
            EntityKind::Session,
            meta(&[("z", json!(1)), ("a", json!([1, 2])), ("m", json!({"k": "v"}))]),
        );
        assert_eq!(
            e.encode_metadata(HashKey::Data, None, &[])?,
            e.encode_metadata(HashKey::Data, None, &[])?
        );
        Ok(())
    }

    #[test]
    fn corrupt_metadata() {
        let e = Entity::new(EntityKind::Subject, Metadata::new());
        let path = ArchivePath::new(vec![".metadata"]);
        let id = e.id().to_string();
        let other = EntityId::generate().to_string();
        let cases = vec![
            b"{not json".to_vec(),
            b"[1, 2]".to_vec(),
            br#"{".dataHash": ""}"#.to_vec(),
            json!({ ".uniqueID": id }).to_string().into_bytes(),
            json!({ ".uniqueID": id, ".dataHash": 7 }).to_string().into_bytes(),
            json!({ ".uniqueID": 1, ".dataHash": "" }).to_string().into_bytes(),
            json!({ ".uniqueID": other, ".dataHash": "" }).to_string().into_bytes(),
            json!({ ".uniqueID": id, ".dataHash": "", ".calculatedInformation": 3 })
                .to_string()
                .into_bytes(),
        ];
        for data in cases {
            let res = e.decode_metadata(&path, HashKey::Data, &data);
            assert!(
                matches!(res, Err(Error::MetadataCorrupt { .. })),
                "{:?}",
                String::from_utf8_lossy(&data)
            );
        }
    }
}
