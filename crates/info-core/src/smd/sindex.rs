//! `sindex-create`/`sindex-delete`/`sindex-exists`/`sindex-list`: the worked
//! example of the snapshot-classify-apply pattern.
//!
//! Parses `ns`/`set`/`indexname`/`indextype`/`indexdata`, builds a
//! definition key, classifies the create against any existing definition
//! under that key (identical definition -> idempotent success, different
//! definition -> conflict), then forwards the effective change to SMD.

use super::{Classification, SmdClient, DEFAULT_SMD_TIMEOUT, UNBOUNDED_SMD_TIMEOUT};
use crate::error::{Error, ErrorKind, Result};
use crate::params::{self, Outcome};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IndexType {
    Default,
    List,
    MapKeys,
    MapValues,
}

impl IndexType {
    fn parse(s: &str) -> Result<IndexType> {
        match s {
            "default" => Ok(IndexType::Default),
            "list" => Ok(IndexType::List),
            "mapkeys" => Ok(IndexType::MapKeys),
            "mapvalues" => Ok(IndexType::MapValues),
            other => Err(Error::new(
                ErrorKind::BadParam,
                format!("bad 'indextype' '{}' - must be one of 'default', 'list', 'mapkeys', 'mapvalues'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinType {
    Numeric,
    String,
    Blob,
}

impl BinType {
    fn parse(s: &str) -> Result<BinType> {
        match s {
            "numeric" => Ok(BinType::Numeric),
            "string" => Ok(BinType::String),
            "blob" => Ok(BinType::Blob),
            other => Err(Error::new(ErrorKind::BadParam, format!("bad 'indexdata' bin type '{}'", other))),
        }
    }
}

/// A parsed, fully-validated `sindex-create` request, independent of any
/// current cluster state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SindexDef {
    pub namespace: String,
    pub set: Option<String>,
    pub index_name: String,
    pub index_type: IndexType,
    pub bin_name: String,
    pub bin_type: BinType,
    /// Base64-encoded nested CDT (list/map) context, for indexing into a
    /// path inside a complex bin rather than the bin's top level.
    pub context: Option<String>,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            IndexType::Default => "default",
            IndexType::List => "list",
            IndexType::MapKeys => "mapkeys",
            IndexType::MapValues => "mapvalues",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BinType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinType::Numeric => "numeric",
            BinType::String => "string",
            BinType::Blob => "blob",
        };
        write!(f, "{}", s)
    }
}

/// Per-namespace sindex definition cap enforced by the `max-count`
/// classification branch. 256 is a representative ceiling.
const MAX_SINDEXES_PER_NAMESPACE: usize = 256;

impl SindexDef {
    /// The SMD key this *definition* is stored under: namespace, set (or the
    /// empty string for "all sets"), bin, context, index type and bin type.
    /// Two definitions that differ in any of these components yield distinct
    /// keys. The key deliberately excludes `index_name`, so a name can
    /// collide with a different key (conflict/ambiguous) or match the key
    /// exactly (idempotent).
    pub fn smd_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.namespace,
            self.set.as_deref().unwrap_or(""),
            self.bin_name,
            self.context.as_deref().unwrap_or(""),
            self.index_type,
            self.bin_type,
        )
    }

    /// The SMD value is just the index name.
    pub fn smd_value(&self) -> &str {
        &self.index_name
    }
}

pub fn parse_create(params: &str) -> Result<SindexDef> {
    let index_name = match params::extract_default(params, "indexname") {
        Outcome::Found(v) => v.to_string(),
        Outcome::Missing => return Err(Error::new(ErrorKind::BadParam, "missing 'indexname'")),
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'indexname' too long")),
    };

    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        Outcome::Missing => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'ns' too long")),
    };

    let set = match params::extract_default(params, "set") {
        Outcome::Found(v) if !v.is_empty() => Some(v.to_string()),
        Outcome::Found(_) => return Err(Error::new(ErrorKind::BadParam, "zero-length 'set'")),
        Outcome::Missing => None,
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'set' too long")),
    };

    let index_type = match params::extract_default(params, "indextype") {
        Outcome::Found(v) => IndexType::parse(v)?,
        Outcome::Missing => IndexType::Default,
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'indextype' too long")),
    };

    let context = match params::extract_default(params, "context") {
        Outcome::Found(v) => {
            let decoded = BASE64
                .decode(v)
                .map_err(|_| Error::new(ErrorKind::BadParam, "'context' invalid base64"))?;
            validate_cdt_context(&decoded)?;
            Some(v.to_string())
        }
        Outcome::Missing => None,
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'context' too long")),
    };

    let indexdata = match params::extract_default(params, "indexdata") {
        Outcome::Found(v) => v,
        Outcome::Missing => return Err(Error::new(ErrorKind::BadParam, "missing 'indexdata'")),
        Outcome::TooLong => return Err(Error::new(ErrorKind::TooLong, "'indexdata' too long")),
    };

    let (bin_name, bin_type_str) = indexdata
        .split_once(',')
        .ok_or_else(|| Error::new(ErrorKind::BadParam, "'indexdata' missing bin type"))?;

    if bin_name.is_empty() {
        return Err(Error::new(ErrorKind::BadParam, "'indexdata' missing bin name"));
    }

    let bin_type = BinType::parse(bin_type_str)?;

    Ok(SindexDef {
        namespace,
        set,
        index_name,
        index_type,
        bin_name: bin_name.to_string(),
        bin_type,
        context,
    })
}

/// Checks that decoded `context` bytes begin with a msgpack array header in
/// its normalized (shortest) encoding -- a real CDT context is always a
/// msgpack array of path steps, and the wire protocol rejects any producer
/// that didn't use the minimal-width encoding for it. This stops short of
/// walking the full path (parsing each step's type/value) the storage layer
/// would do; it only rules out the two named rejection kinds that are
/// cheap to check up front.
fn validate_cdt_context(bytes: &[u8]) -> Result<()> {
    let header = *bytes
        .first()
        .ok_or_else(|| Error::new(ErrorKind::BadParam, "'context' invalid-cdt-context: empty"))?;

    match header {
        // fixarray: 1000xxxx, length 0-15 encoded in the low nibble.
        0x90..=0x9f => Ok(()),
        // array16/array32 headers are only valid msgpack when the length
        // doesn't fit in a fixarray; any producer using them for a context
        // short enough to fixarray-encode has not normalized its output.
        0xdc | 0xdd => Err(Error::new(ErrorKind::BadParam, "'context' not-normalized-msgpack")),
        _ => Err(Error::new(ErrorKind::BadParam, "'context' invalid-cdt-context")),
    }
}

/// One pass over the namespace's current sindex snapshot, gathering exactly
/// what the classifier needs: whether `def`'s exact composed key is already
/// present, how many other entries in the namespace carry the same
/// `indexname`, the key of that match when there's exactly one, and the
/// total number of definitions in the namespace.
struct Snapshot {
    exact_key_present: bool,
    name_matches: u32,
    unique_name_match_key: Option<String>,
    namespace_count: usize,
}

fn snapshot(smd: &dyn SmdClient, namespace: &str, key: &str, index_name: &str) -> Result<Snapshot> {
    let prefix = format!("{}|", namespace);
    let mut exact_key_present = false;
    let mut name_matches = 0u32;
    let mut unique_name_match_key = None;
    let mut namespace_count = 0usize;

    smd.get_all("sindex", &mut |k, v| {
        if !k.starts_with(&prefix) {
            return;
        }
        namespace_count += 1;
        if k == key {
            exact_key_present = true;
        }
        if v == index_name {
            name_matches += 1;
            unique_name_match_key = Some(k.to_string());
        }
    })?;

    Ok(Snapshot { exact_key_present, name_matches, unique_name_match_key, namespace_count })
}

/// Classifies a create request against one pass over current SMD state:
/// same key present wins first as idempotent even if a same-named
/// different-key entry also exists, then a unique differently-keyed name
/// match is a conflict, then two-or-more name matches is ambiguous, then
/// the per-namespace cap, and only then apply.
pub fn classify_create(smd: &dyn SmdClient, def: &SindexDef) -> Result<Classification<SindexDef>> {
    let key = def.smd_key();
    let snap = snapshot(smd, &def.namespace, &key, &def.index_name)?;

    if snap.exact_key_present {
        return Ok(Classification::Idempotent);
    }
    if snap.name_matches == 1 {
        let found_key = snap.unique_name_match_key.expect("name_matches == 1 implies a found key");
        debug_assert_ne!(found_key, key, "exact key match already handled above");
        return Ok(Classification::Conflict(format!(
            "'{}' already exists with a different definition",
            def.index_name
        )));
    }
    if snap.name_matches >= 2 {
        return Ok(Classification::Conflict(format!(
            "'{}' already exists with {} definitions - rename(s) required",
            def.index_name, snap.name_matches
        )));
    }
    if snap.namespace_count >= MAX_SINDEXES_PER_NAMESPACE {
        return Ok(Classification::MaxCount);
    }

    Ok(Classification::Apply(def.clone()))
}

pub fn create(smd: &dyn SmdClient, params: &str) -> Result<()> {
    let def = parse_create(params)?;

    match classify_create(smd, &def)? {
        Classification::Apply(def) => {
            // Unbounded: an index build already under way must not be
            // abandoned by a client-side timeout (spec.md §4.G step 5).
            smd.blocking_set("sindex", &def.smd_key(), def.smd_value(), UNBOUNDED_SMD_TIMEOUT)
        }
        Classification::Idempotent => Ok(()),
        Classification::Conflict(detail) => Err(Error::new(ErrorKind::Conflict, detail)),
        Classification::MaxCount => {
            Err(Error::new(ErrorKind::MaxCount, "already at sindex definition limit"))
        }
    }
}

/// Deletion mirrors creation: a unique name match is located and its key
/// dropped; an absent name is idempotent success; an ambiguous name
/// (matches under more than one key) is a conflict requiring a rename
/// first.
pub fn delete(smd: &dyn SmdClient, params: &str) -> Result<()> {
    let index_name = match params::extract_default(params, "indexname") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'indexname'")),
    };
    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
    };

    let prefix = format!("{}|", namespace);
    let mut name_matches = 0u32;
    let mut found_key: Option<String> = None;

    smd.get_all("sindex", &mut |k, v| {
        if k.starts_with(&prefix) && v == index_name {
            name_matches += 1;
            found_key = Some(k.to_string());
        }
    })?;

    match name_matches {
        0 => Ok(()), // absent is idempotent success
        1 => smd.blocking_delete("sindex", &found_key.expect("name_matches == 1"), DEFAULT_SMD_TIMEOUT),
        _ => Err(Error::new(ErrorKind::Conflict, "'indexname' is not unique")),
    }
}

pub fn exists(smd: &dyn SmdClient, params: &str) -> Result<bool> {
    let index_name = match params::extract_default(params, "indexname") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'indexname'")),
    };
    let namespace = match params::extract_default(params, "ns") {
        Outcome::Found(v) => v.to_string(),
        _ => return Err(Error::new(ErrorKind::BadParam, "missing 'ns'")),
    };

    let prefix = format!("{}|", namespace);
    let mut found = false;
    smd.get_all("sindex", &mut |k, v| {
        if k.starts_with(&prefix) && v == index_name {
            found = true;
        }
    })?;

    Ok(found)
}

/// `sindex-list:ns=<ns>` renders every known definition for the namespace
/// as one `ns=..:set=..:bin=..:indexname=..` record per line. The key's
/// `context`/`itype`/`ktype` components are omitted from the summary line
/// and stay internal to the SMD key alone.
pub fn list(smd: &dyn SmdClient, namespace: &str) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let prefix = format!("{}|", namespace);

    smd.get_all("sindex", &mut |k, v| {
        if let Some(rest) = k.strip_prefix(&prefix) {
            let mut parts = rest.splitn(3, '|');
            if let (Some(set), Some(bin)) = (parts.next(), parts.next()) {
                lines.push(format!("ns={}:set={}:bin={}:indexname={}", namespace, set, bin, v));
            }
        }
    })?;

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSmd {
        store: RefCell<HashMap<String, String>>,
    }

    impl SmdClient for FakeSmd {
        fn get_all(&self, _module: &str, visitor: &mut dyn FnMut(&str, &str)) -> Result<()> {
            for (k, v) in self.store.borrow().iter() {
                visitor(k, v);
            }
            Ok(())
        }

        fn blocking_set(&self, _module: &str, key: &str, value: &str, _timeout: Duration) -> Result<()> {
            self.store.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn blocking_delete(&self, _module: &str, key: &str, _timeout: Duration) -> Result<()> {
            self.store.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[test]
    fn parses_a_well_formed_create_request() {
        let def = parse_create("ns=test;set=demo;indexname=idx_age;indexdata=age,numeric").unwrap();
        assert_eq!(def.namespace, "test");
        assert_eq!(def.set.as_deref(), Some("demo"));
        assert_eq!(def.index_type, IndexType::Default);
        assert_eq!(def.bin_name, "age");
        assert_eq!(def.bin_type, BinType::Numeric);
    }

    #[test]
    fn create_is_idempotent_on_identical_redefinition() {
        let smd = FakeSmd::default();
        let params = "ns=test;set=demo;indexname=idx_age;indexdata=age,numeric";

        create(&smd, params).unwrap();
        assert!(create(&smd, params).is_ok());
        assert_eq!(smd.store.borrow().len(), 1);
    }

    #[test]
    fn create_conflicts_on_same_name_different_definition() {
        let smd = FakeSmd::default();
        create(&smd, "ns=test;set=demo;indexname=idx_age;indexdata=age,numeric").unwrap();

        let result = create(&smd, "ns=test;set=demo;indexname=idx_age;indexdata=name,string");
        assert!(result.is_err());
    }

    #[test]
    fn delete_of_absent_index_is_a_no_op_success() {
        let smd = FakeSmd::default();
        assert!(delete(&smd, "ns=test;indexname=ghost").is_ok());
    }

    #[test]
    fn context_must_be_valid_base64() {
        let result = parse_create("ns=test;set=demo;indexname=idx_age;context=not-valid-base64!!;indexdata=age,numeric");
        assert!(result.is_err());
    }

    #[test]
    fn valid_base64_context_is_accepted() {
        // "kQ==" decodes to 0x91, a one-element fixarray header.
        let def = parse_create("ns=test;set=demo;indexname=idx_age;context=kQ==;indexdata=age,numeric").unwrap();
        assert_eq!(def.context.as_deref(), Some("kQ=="));
    }

    #[test]
    fn context_with_valid_base64_but_non_array_bytes_is_rejected() {
        // "AQID" decodes to [0x01, 0x02, 0x03]; 0x01 is not a msgpack array header.
        let result = parse_create("ns=test;set=demo;indexname=idx_age;context=AQID;indexdata=age,numeric");
        assert!(result.is_err());
        assert!(result.unwrap_err().detail().contains("invalid-cdt-context"));
    }

    #[test]
    fn context_using_non_normalized_array16_header_is_rejected() {
        // "3A==" decodes to 0xdc, the array16 header, never minimal for a
        // length that would fit in a fixarray.
        let result = parse_create("ns=test;set=demo;indexname=idx_age;context=3A==;indexdata=age,numeric");
        assert!(result.is_err());
        assert!(result.unwrap_err().detail().contains("not-normalized-msgpack"));
    }

    #[test]
    fn exists_reflects_current_smd_state() {
        let smd = FakeSmd::default();
        create(&smd, "ns=test;set=demo;indexname=idx_age;indexdata=age,numeric").unwrap();

        assert!(exists(&smd, "ns=test;indexname=idx_age").unwrap());
        assert!(!exists(&smd, "ns=test;indexname=missing").unwrap());
    }

    /// Two prior creates with the same `indexname` but different composed
    /// keys (different bin) make the name ambiguous. This requires the SMD
    /// key to exclude `indexname` -- if the key were
    /// derived from the name, two distinct definitions could never share it.
    #[test]
    fn delete_is_ambiguous_when_name_matches_two_distinct_keys() {
        let smd = FakeSmd::default();
        create(&smd, "ns=test;set=demo;indexname=idx_a;indexdata=age,numeric").unwrap();
        create(&smd, "ns=test;set=demo;indexname=idx_a;indexdata=name,string").unwrap();

        let result = delete(&smd, "ns=test;indexname=idx_a");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().detail(), "'indexname' is not unique");
    }

    #[test]
    fn create_is_max_count_at_the_namespace_cap() {
        let smd = FakeSmd::default();
        for i in 0..MAX_SINDEXES_PER_NAMESPACE {
            create(&smd, &format!("ns=test;set=demo;indexname=idx_{};indexdata=bin_{},numeric", i, i)).unwrap();
        }

        let result = create(&smd, "ns=test;set=demo;indexname=idx_overflow;indexdata=bin_overflow,numeric");
        assert!(matches!(result.unwrap_err().kind(), ErrorKind::MaxCount));
    }

    #[test]
    fn create_is_not_max_count_when_redefining_an_existing_name_at_the_cap() {
        let smd = FakeSmd::default();
        for i in 0..MAX_SINDEXES_PER_NAMESPACE {
            create(&smd, &format!("ns=test;set=demo;indexname=idx_{};indexdata=bin_{},numeric", i, i)).unwrap();
        }

        // Re-creating an already-present exact definition at the cap is
        // still idempotent success, not max-count.
        assert!(create(&smd, "ns=test;set=demo;indexname=idx_0;indexdata=bin_0,numeric").is_ok());
    }
}
