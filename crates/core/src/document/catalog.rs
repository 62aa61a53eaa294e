//! Document object graph.
//!
//! A [`Document`] owns the file bytes, the cross-reference index and every
//! materialized object. Objects are parsed on first access, decrypted when
//! the document is encrypted, and cached as `Arc`s so repeated lookups share
//! one value. Links between objects stay `PDFObjRef`s until a caller
//! resolves them.

use super::options::ParseOptions;
use super::permissions::Permissions;
use super::security::{CryptMethod, PasswordType, StandardSecurityHandler, password_bytes};
use super::xref::{XRefEntry, XRefTable, load_xref};
use crate::codec::filters::FilterRegistry;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObjRef, PDFObject, PDFStream, PDFString};
use crate::parser::{ObjectParser, RefResolver};
use bytes::Bytes;
use memmap2::Mmap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Parsed header of an object stream.
#[derive(Debug)]
struct ObjectStream {
    /// Decoded stream payload.
    data: Vec<u8>,
    /// `(objid, absolute offset in data)` per contained object.
    objects: Vec<(u32, usize)>,
}

/// Removes an object from the in-progress set when resolution finishes.
struct ResolvingGuard<'a> {
    set: &'a Mutex<FxHashSet<PDFObjRef>>,
    objref: PDFObjRef,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.objref);
    }
}

/// A PDF file's indirect objects, trailer and security state.
pub struct Document {
    data: Bytes,
    options: ParseOptions,
    xref: XRefTable,
    filters: FilterRegistry,
    security: Option<StandardSecurityHandler>,
    /// The `/Encrypt` dictionary's own reference; never decrypted.
    encrypt_ref: Option<PDFObjRef>,
    /// Keyed by the reference as requested, generation included.
    cache: Mutex<FxHashMap<PDFObjRef, Arc<PDFObject>>>,
    resolving: Mutex<FxHashSet<PDFObjRef>>,
    objstm_cache: Mutex<FxHashMap<u32, Arc<ObjectStream>>>,
    /// objid -> (object stream, index), built on demand for rebuilt xrefs.
    objstm_index: Mutex<Option<FxHashMap<u32, (u32, usize)>>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.data.len())
            .field("objects", &self.xref.len())
            .field("encrypted", &self.is_encrypted())
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Parse a document, locating objects through its cross-reference data.
    ///
    /// Encrypted documents are tried with the empty password; if that fails
    /// they stay locked until [`Document::authenticate`] succeeds.
    pub fn load(data: impl Into<Bytes>, options: ParseOptions) -> Result<Self> {
        let data = data.into();
        let filters = FilterRegistry::default();
        let xref = load_xref(&data, options, &filters)?;
        Self::from_xref(data, xref, options)
    }

    /// Parse a memory-mapped file without copying it.
    pub fn from_mmap(mmap: Mmap, options: ParseOptions) -> Result<Self> {
        Self::load(Bytes::from_owner(mmap), options)
    }

    /// Build a document over `data` using an explicit object index.
    pub fn from_xref(data: impl Into<Bytes>, xref: XRefTable, options: ParseOptions) -> Result<Self> {
        let mut doc = Self {
            data: data.into(),
            options,
            xref,
            filters: FilterRegistry::default(),
            security: None,
            encrypt_ref: None,
            cache: Mutex::new(FxHashMap::default()),
            resolving: Mutex::new(FxHashSet::default()),
            objstm_cache: Mutex::new(FxHashMap::default()),
            objstm_index: Mutex::new(None),
        };
        doc.init_security()?;
        Ok(doc)
    }

    /// Replace the stream filter registry.
    #[must_use]
    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    fn init_security(&mut self) -> Result<()> {
        let Some(encrypt) = self.xref.trailer().get("Encrypt").cloned() else {
            return Ok(());
        };
        // The encryption dictionary is read before any handler exists, so it
        // is cached in clear.
        let dict = match &encrypt {
            PDFObject::Ref(objref) => {
                self.encrypt_ref = Some(*objref);
                self.get_object(*objref)?.as_dict()?.clone()
            }
            other => other.as_dict()?.clone(),
        };
        let doc_id = self.document_id()?;
        let mut handler = StandardSecurityHandler::from_encrypt_dict(&dict, doc_id)?;
        let unlocked = handler.authenticate(b"")?.is_some();
        tracing::debug!(
            v = handler.params().v,
            r = handler.params().r,
            unlocked,
            "document is encrypted"
        );
        self.security = Some(handler);
        Ok(())
    }

    /// First element of the trailer `/ID` array, or empty.
    fn document_id(&self) -> Result<Vec<u8>> {
        let Some(id) = self.xref.trailer().get("ID") else {
            return Ok(Vec::new());
        };
        let id = self.resolve(id)?;
        Ok(id
            .as_array()
            .ok()
            .and_then(|items| items.first())
            .and_then(|first| first.as_bytes().ok())
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub const fn options(&self) -> ParseOptions {
        self.options
    }

    pub const fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// Merged trailer dictionary.
    pub const fn trailer(&self) -> &PDFDict {
        self.xref.trailer()
    }

    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub const fn security(&self) -> Option<&StandardSecurityHandler> {
        self.security.as_ref()
    }

    pub const fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    /// Whether encrypted content is still inaccessible.
    pub fn is_locked(&self) -> bool {
        self.security.as_ref().is_some_and(|h| !h.is_unlocked())
    }

    /// User permissions, `None` for unencrypted documents.
    pub fn permissions(&self) -> Option<Permissions> {
        self.security.as_ref().map(StandardSecurityHandler::permissions)
    }

    /// Try a password. Returns `true` when it is the user or owner password.
    pub fn authenticate(&mut self, password: &str) -> bool {
        self.authenticate_as(password).is_ok()
    }

    /// Like [`Document::authenticate`], reporting which password matched.
    pub fn authenticate_as(&mut self, password: &str) -> Result<PasswordType> {
        self.authenticate_bytes(&password_bytes(password))
    }

    /// Try a password given as raw bytes.
    pub fn authenticate_bytes(&mut self, password: &[u8]) -> Result<PasswordType> {
        let Some(handler) = self.security.as_mut() else {
            return Err(PdfError::AuthenticationFailed);
        };
        handler.authenticate(password)?.ok_or(PdfError::AuthenticationFailed)
    }

    /// In-use object references, ascending.
    pub fn object_refs(&self) -> Vec<PDFObjRef> {
        self.xref
            .objids()
            .into_iter()
            .map(|objid| {
                let genno = match self.xref.get(objid) {
                    Some(XRefEntry::Offset { genno, .. }) => genno,
                    _ => 0,
                };
                PDFObjRef::new(objid, genno)
            })
            .collect()
    }

    /// The document catalog (`/Root`).
    pub fn catalog(&self) -> Result<Arc<PDFObject>> {
        let root = self
            .trailer()
            .get("Root")
            .ok_or_else(|| PdfError::KeyError("Root".into()))?;
        self.resolve(root)
    }

    /// The document information dictionary, if any.
    pub fn info(&self) -> Result<Option<Arc<PDFObject>>> {
        self.trailer().get("Info").map(|info| self.resolve(info)).transpose()
    }

    /// Follow references until a direct object is reached.
    ///
    /// A chain that returns to an object already on it ends in `Null`.
    pub fn resolve(&self, obj: &PDFObject) -> Result<Arc<PDFObject>> {
        let PDFObject::Ref(start) = obj else {
            return Ok(Arc::new(obj.clone()));
        };
        let mut objref = *start;
        let mut seen = FxHashSet::default();
        loop {
            if !seen.insert(objref) {
                tracing::warn!(%objref, "reference cycle");
                return Ok(Arc::new(PDFObject::Null));
            }
            let target = self.get_object(objref)?;
            match target.as_ref() {
                PDFObject::Ref(next) => objref = *next,
                _ => return Ok(target),
            }
        }
    }

    /// Resolve a reference to a direct object.
    pub fn resolve_ref(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>> {
        self.resolve(&PDFObject::Ref(objref))
    }

    /// Materialize one indirect object without following the reference it
    /// may itself contain.
    ///
    /// Re-entering an object that is still being materialized yields `Null`.
    /// A missing object is `Null` in lenient mode and `ObjectNotFound` in
    /// strict mode.
    pub fn get_object(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>> {
        if let Some(obj) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&objref)
        {
            return Ok(Arc::clone(obj));
        }

        let newly_entered = self
            .resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(objref);
        if !newly_entered {
            tracing::warn!(%objref, "cycle while materializing object");
            return Ok(Arc::new(PDFObject::Null));
        }
        let _guard = ResolvingGuard {
            set: &self.resolving,
            objref,
        };

        let Some(obj) = self.load_object(objref)? else {
            return self.missing(objref);
        };
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(objref).or_insert_with(|| Arc::new(obj))))
    }

    fn missing(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>> {
        if self.options.strict {
            return Err(PdfError::ObjectNotFound {
                objid: objref.objid,
                genno: objref.genno,
            });
        }
        tracing::warn!(%objref, "object not found, using null");
        Ok(Arc::new(PDFObject::Null))
    }

    /// Parse and decrypt an object. `None` when it does not exist.
    fn load_object(&self, objref: PDFObjRef) -> Result<Option<PDFObject>> {
        match self.xref.get(objref.objid) {
            Some(XRefEntry::Offset { offset, genno }) => {
                if genno != objref.genno {
                    if self.options.strict {
                        return Ok(None);
                    }
                    tracing::debug!(%objref, genno, "generation mismatch, using xref entry");
                }
                let obj = self.parse_at(offset, objref)?;
                self.decrypt_object(obj, PDFObjRef::new(objref.objid, genno))
                    .map(Some)
            }
            // Objects in object streams were decrypted with their container.
            Some(XRefEntry::Compressed { stream, index }) => {
                self.object_from_stream(stream, index, objref.objid)
            }
            Some(XRefEntry::Free) => Ok(None),
            None if self.xref.is_fallback() => {
                let location = self.objstm_location(objref.objid)?;
                match location {
                    Some((stream, index)) => self.object_from_stream(stream, index, objref.objid),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    fn parse_at(&self, offset: usize, objref: PDFObjRef) -> Result<PDFObject> {
        if offset >= self.data.len() {
            return Err(PdfError::malformed(
                offset,
                format!("offset of {objref} is past the end of the file"),
            ));
        }
        let mut parser = ObjectParser::from_bytes(&self.data)
            .with_options(self.options)
            .with_resolver(self);
        parser.set_pos(offset);
        let (found, obj) = parser.parse_indirect_object()?;
        if found.objid != objref.objid {
            if self.options.strict {
                return Err(PdfError::malformed(
                    offset,
                    format!("expected object {objref}, found {found}"),
                ));
            }
            tracing::warn!(%objref, %found, "xref offset points at a different object");
        }
        Ok(obj)
    }

    fn object_from_stream(&self, stream: u32, index: usize, objid: u32) -> Result<Option<PDFObject>> {
        let objstm = self.object_stream(stream)?;
        // Trust the header over the xref index when they disagree.
        let offset = match objstm.objects.get(index) {
            Some(&(id, offset)) if id == objid => offset,
            _ => match objstm.objects.iter().find(|(id, _)| *id == objid) {
                Some(&(_, offset)) => offset,
                None => return Ok(None),
            },
        };
        let mut parser = ObjectParser::new(&objstm.data).with_options(self.options);
        parser.set_pos(offset);
        parser.parse_object().map(Some)
    }

    fn object_stream(&self, objid: u32) -> Result<Arc<ObjectStream>> {
        if let Ok(cache) = self.objstm_cache.lock()
            && let Some(objstm) = cache.get(&objid)
        {
            return Ok(Arc::clone(objstm));
        }

        let container = self.get_object(PDFObjRef::new(objid, 0))?;
        let stream = container.as_stream()?;
        let data = self.stream_data(stream)?;
        let count = stream
            .get("N")
            .ok_or_else(|| PdfError::KeyError("N".into()))?
            .as_int()?;
        let first = stream
            .get("First")
            .ok_or_else(|| PdfError::KeyError("First".into()))?
            .as_int()?;
        let first = usize::try_from(first)
            .ok()
            .filter(|&first| first <= data.len())
            .ok_or_else(|| PdfError::DecodeError(format!("object stream /First {first} out of range")))?;

        let mut header = ObjectParser::new(&data[..first]);
        let mut objects = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            let (Ok(PDFObject::Int(id)), Ok(PDFObject::Int(offset))) =
                (header.parse_object(), header.parse_object())
            else {
                tracing::warn!(objid, "truncated object stream header");
                break;
            };
            if let (Ok(id), Ok(offset)) = (u32::try_from(id), usize::try_from(offset)) {
                objects.push((id, first + offset));
            }
        }

        let objstm = Arc::new(ObjectStream { data, objects });
        if let Ok(mut cache) = self.objstm_cache.lock() {
            cache.insert(objid, Arc::clone(&objstm));
        }
        Ok(objstm)
    }

    /// Locate an object inside any object stream of a rebuilt index.
    fn objstm_location(&self, objid: u32) -> Result<Option<(u32, usize)>> {
        if let Ok(index) = self.objstm_index.lock()
            && let Some(index) = index.as_ref()
        {
            return Ok(index.get(&objid).copied());
        }

        let mut index = FxHashMap::default();
        for container in self.xref.objids() {
            let Ok(obj) = self.get_object(PDFObjRef::new(container, 0)) else {
                continue;
            };
            let PDFObject::Stream(stream) = obj.as_ref() else {
                continue;
            };
            if !stream.is_type("ObjStm") {
                continue;
            }
            let Ok(objstm) = self.object_stream(container) else {
                continue;
            };
            for (i, (id, _)) in objstm.objects.iter().enumerate() {
                index.entry(*id).or_insert((container, i));
            }
        }
        tracing::debug!(objects = index.len(), "indexed object streams");
        let found = index.get(&objid).copied();
        if let Ok(mut slot) = self.objstm_index.lock() {
            *slot = Some(index);
        }
        Ok(found)
    }

    /// Whether reading `obj` needs the file key.
    fn needs_key(handler: &StandardSecurityHandler, obj: &PDFObject) -> bool {
        match obj {
            PDFObject::String(_) => handler.params().str_method != CryptMethod::Identity,
            PDFObject::Stream(stream) => {
                handler.params().stream_method(&stream.attrs) != CryptMethod::Identity
                    || stream.attrs.values().any(|v| Self::needs_key(handler, v))
            }
            PDFObject::Array(items) => items.iter().any(|v| Self::needs_key(handler, v)),
            PDFObject::Dict(dict) => dict.values().any(|v| Self::needs_key(handler, v)),
            _ => false,
        }
    }

    fn decrypt_object(&self, obj: PDFObject, objref: PDFObjRef) -> Result<PDFObject> {
        let Some(handler) = &self.security else {
            return Ok(obj);
        };
        if self.encrypt_ref.is_some_and(|r| r.objid == objref.objid) || !obj.contains_encryptable() {
            return Ok(obj);
        }
        if !handler.is_unlocked() {
            if Self::needs_key(handler, &obj) {
                return Err(PdfError::DocumentLocked);
            }
            return Ok(obj);
        }
        Self::decrypt_value(handler, obj, objref)
    }

    fn decrypt_value(
        handler: &StandardSecurityHandler,
        obj: PDFObject,
        objref: PDFObjRef,
    ) -> Result<PDFObject> {
        Ok(match obj {
            PDFObject::String(s) => {
                PDFObject::String(PDFString::from_bytes(handler.decrypt_string(objref, s.as_bytes())?))
            }
            PDFObject::Array(items) => PDFObject::Array(
                items
                    .into_iter()
                    .map(|item| Self::decrypt_value(handler, item, objref))
                    .collect::<Result<_>>()?,
            ),
            PDFObject::Dict(dict) => PDFObject::Dict(Self::decrypt_dict(handler, dict, objref)?),
            PDFObject::Stream(mut stream) => {
                stream.attrs = Self::decrypt_dict(handler, std::mem::take(&mut stream.attrs), objref)?;
                if !stream.rawdata_is_decrypted() {
                    let plain = handler.decrypt_stream(objref, &stream)?;
                    stream.set_rawdata_decrypted(plain);
                }
                PDFObject::Stream(stream)
            }
            other => other,
        })
    }

    fn decrypt_dict(
        handler: &StandardSecurityHandler,
        dict: PDFDict,
        objref: PDFObjRef,
    ) -> Result<PDFDict> {
        dict.into_iter()
            .map(|(key, value)| -> Result<(String, PDFObject)> {
                Ok((key, Self::decrypt_value(handler, value, objref)?))
            })
            .collect()
    }

    /// Decoded payload of a stream: its (already decrypted) bytes run
    /// through the `/Filter` chain.
    pub fn stream_data(&self, stream: &PDFStream) -> Result<Vec<u8>> {
        if !stream.rawdata_is_decrypted()
            && let Some(handler) = &self.security
            && handler.params().stream_method(&stream.attrs) != CryptMethod::Identity
            && stream.objref.is_some_and(|r| Some(r) != self.encrypt_ref)
        {
            // Streams parsed by this document are decrypted on load; this
            // only happens for streams built elsewhere.
            return Err(PdfError::DecryptionError(
                "stream data has not been decrypted".into(),
            ));
        }
        let filters = stream.get("Filter").map(|f| self.resolve(f)).transpose()?;
        let params = stream
            .get("DecodeParms")
            .map(|p| self.resolve(p))
            .transpose()?;
        self.filters
            .apply(stream.get_rawdata(), filters.as_deref(), params.as_deref())
    }
}

impl RefResolver for Document {
    fn resolve_ref(&self, objref: PDFObjRef) -> Result<Arc<PDFObject>> {
        Document::resolve_ref(self, objref)
    }
}
