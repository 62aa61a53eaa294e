//! Standard security handler (RC4 40/128-bit and AES-128, revisions 2-4).
//!
//! The handler starts `Locked`. A successful [`StandardSecurityHandler::authenticate`]
//! fixes the file key and moves it to `Unlocked`; there is no way back.

use super::permissions::Permissions;
use crate::codec::aes::{AES_BLOCK, aes_decrypt_with_iv, aes_encrypt_with_iv};
use crate::codec::arcfour::rc4;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObjRef, PDFObject, PDFStream};
use rustc_hash::FxHashMap;

/// Password padding string for the standard security handler.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

const AES_SALT: &[u8] = b"sAlT";

/// Crypt filter method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    /// RC4
    Rc4,
    /// AES-128-CBC
    AesV2,
}

/// Which password unlocked the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordType {
    User,
    Owner,
}

/// Encode a text password: Latin-1 when every char fits, UTF-8 otherwise.
pub fn password_bytes(password: &str) -> Vec<u8> {
    password
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()
        .unwrap_or_else(|| password.as_bytes().to_vec())
}

/// Pad or truncate a password to exactly 32 bytes.
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

/// Values read from an `/Encrypt` dictionary with `/Filter /Standard`.
#[derive(Debug, Clone)]
pub struct EncryptionParams {
    /// Algorithm version (`/V`), 1 to 4.
    pub v: i64,
    /// Revision (`/R`), 2 to 4.
    pub r: i64,
    /// File key length in bytes.
    pub key_len: usize,
    pub o: Vec<u8>,
    pub u: Vec<u8>,
    pub p: i32,
    pub encrypt_metadata: bool,
    pub stm_method: CryptMethod,
    pub str_method: CryptMethod,
    pub ef_method: CryptMethod,
    /// Named crypt filters from `/CF`, for streams carrying a `/Crypt` filter.
    crypt_filters: FxHashMap<String, CryptMethod>,
}

impl EncryptionParams {
    /// Parameters for a new RC4 (V1/V2) configuration with empty `/O` `/U`.
    pub fn rc4(key_bits: usize, permissions: Permissions) -> Self {
        let (v, r) = if key_bits <= 40 { (1, 2) } else { (2, 3) };
        Self {
            v,
            r,
            key_len: key_bits / 8,
            o: Vec::new(),
            u: Vec::new(),
            p: permissions.to_p(),
            encrypt_metadata: true,
            stm_method: CryptMethod::Rc4,
            str_method: CryptMethod::Rc4,
            ef_method: CryptMethod::Rc4,
            crypt_filters: FxHashMap::default(),
        }
    }

    /// Parameters for a new V4 configuration using one method for strings
    /// and streams (named `StdCF`).
    pub fn v4(method: CryptMethod, permissions: Permissions) -> Self {
        let mut crypt_filters = FxHashMap::default();
        crypt_filters.insert("StdCF".to_string(), method);
        Self {
            v: 4,
            r: 4,
            key_len: 16,
            o: Vec::new(),
            u: Vec::new(),
            p: permissions.to_p(),
            encrypt_metadata: true,
            stm_method: method,
            str_method: method,
            ef_method: method,
            crypt_filters,
        }
    }

    /// Read and validate an encryption dictionary.
    pub fn from_dict(dict: &PDFDict) -> Result<Self> {
        match dict.get("Filter") {
            Some(PDFObject::Name(name)) if name == "Standard" => {}
            Some(PDFObject::Name(name)) => {
                return Err(PdfError::EncryptionUnsupported(format!(
                    "security handler /{name}"
                )));
            }
            _ => {
                return Err(PdfError::EncryptionUnsupported(
                    "missing /Filter in encryption dictionary".into(),
                ));
            }
        }
        if dict.contains_key("SubFilter") {
            return Err(PdfError::EncryptionUnsupported("/SubFilter".into()));
        }

        let v = get_int_default(dict, "V", 0);
        if v == 5 {
            return Err(PdfError::EncryptionUnsupported("AES-256 (/V 5)".into()));
        }
        if !(1..=4).contains(&v) {
            return Err(PdfError::EncryptionUnsupported(format!("/V {v}")));
        }
        let r = get_int(dict, "R")?;
        if !(2..=4).contains(&r) {
            return Err(PdfError::EncryptionUnsupported(format!("/R {r}")));
        }

        let o = get_bytes(dict, "O")?;
        let u = get_bytes(dict, "U")?;
        // /P is a signed 32-bit value; some writers store it unsigned.
        let p = get_int(dict, "P")? as u32 as i32;
        let encrypt_metadata = match dict.get("EncryptMetadata") {
            Some(PDFObject::Bool(b)) => *b,
            _ => true,
        };

        let mut crypt_filters = FxHashMap::default();
        let (stm_method, str_method, ef_method, key_bits) = if v == 4 {
            let cf = dict.get("CF").and_then(|cf| cf.as_dict().ok());
            if let Some(cf) = cf {
                for (name, filter) in cf {
                    if let Ok(filter) = filter.as_dict() {
                        crypt_filters.insert(name.clone(), crypt_method(name, filter)?);
                    }
                }
            }
            let stmf = get_name_default(dict, "StmF", "Identity");
            let strf = get_name_default(dict, "StrF", "Identity");
            let eff = get_name_default(dict, "EFF", stmf);
            let lookup = |name: &str| -> Result<CryptMethod> {
                if name == "Identity" {
                    return Ok(CryptMethod::Identity);
                }
                crypt_filters.get(name).copied().ok_or_else(|| {
                    PdfError::EncryptionUnsupported(format!("crypt filter /{name} is not defined"))
                })
            };
            let key_bits = match dict.get("Length") {
                Some(PDFObject::Int(bits)) => *bits,
                _ => cf
                    .and_then(|cf| cf.get(stmf).or_else(|| cf.get(strf)))
                    .and_then(|f| f.as_dict().ok())
                    .and_then(|f| f.get("Length"))
                    .and_then(|l| l.as_int().ok())
                    // Crypt filter lengths are in bytes, though writers disagree.
                    .map_or(128, |len| if len <= 16 { len * 8 } else { len }),
            };
            (lookup(stmf)?, lookup(strf)?, lookup(eff)?, key_bits)
        } else {
            let key_bits = if v == 1 {
                40
            } else {
                get_int_default(dict, "Length", 40)
            };
            (CryptMethod::Rc4, CryptMethod::Rc4, CryptMethod::Rc4, key_bits)
        };

        if !(40..=128).contains(&key_bits) || key_bits % 8 != 0 {
            return Err(PdfError::EncryptionUnsupported(format!(
                "key length of {key_bits} bits"
            )));
        }

        Ok(Self {
            v,
            r,
            key_len: (key_bits / 8) as usize,
            o,
            u,
            p,
            encrypt_metadata,
            stm_method,
            str_method,
            ef_method,
            crypt_filters,
        })
    }

    pub const fn permissions(&self) -> Permissions {
        Permissions::from_p(self.p)
    }

    /// The `/Encrypt` dictionary describing these parameters.
    pub fn to_dict(&self) -> PDFDict {
        let mut dict = PDFDict::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(self.v));
        dict.insert("R".into(), PDFObject::Int(self.r));
        dict.insert("Length".into(), PDFObject::Int(self.key_len as i64 * 8));
        dict.insert("O".into(), PDFObject::string(self.o.clone()));
        dict.insert("U".into(), PDFObject::string(self.u.clone()));
        dict.insert("P".into(), PDFObject::from(self.p));
        if self.v == 4 {
            let mut names: Vec<&String> = self.crypt_filters.keys().collect();
            names.sort();
            let cf: PDFDict = names
                .iter()
                .map(|name| {
                    let mut filter = PDFDict::new();
                    filter.insert("Type".into(), PDFObject::name("CryptFilter"));
                    filter.insert("CFM".into(), PDFObject::name(method_name(self.crypt_filters[*name])));
                    filter.insert("Length".into(), PDFObject::Int(self.key_len as i64));
                    ((*name).clone(), PDFObject::Dict(filter))
                })
                .collect();
            let filter_for = |method: CryptMethod| -> PDFObject {
                let name = names
                    .iter()
                    .find(|name| self.crypt_filters[**name] == method)
                    .map_or("Identity", |name| name.as_str());
                PDFObject::name(name)
            };
            dict.insert("StmF".into(), filter_for(self.stm_method));
            dict.insert("StrF".into(), filter_for(self.str_method));
            if self.ef_method != self.stm_method {
                dict.insert("EFF".into(), filter_for(self.ef_method));
            }
            dict.insert("CF".into(), PDFObject::Dict(cf));
            if !self.encrypt_metadata {
                dict.insert("EncryptMetadata".into(), PDFObject::Bool(false));
            }
        }
        dict
    }

    /// Bytes of file key: always 5 at revision 2.
    fn file_key_len(&self) -> usize {
        if self.r == 2 { 5 } else { self.key_len }
    }

    /// Compute the file encryption key from a password (Algorithm 2).
    pub fn compute_key(&self, password: &[u8], doc_id: &[u8]) -> Vec<u8> {
        let mut context = md5::Context::new();
        context.consume(pad_password(password));
        context.consume(&self.o);
        context.consume((self.p as u32).to_le_bytes());
        context.consume(doc_id);
        if self.r >= 4 && !self.encrypt_metadata {
            context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
        }
        let mut digest = context.finalize().0;

        let n = self.file_key_len();
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..n]).0;
            }
        }
        digest[..n].to_vec()
    }

    /// Compute the `/U` value for a file key (Algorithms 4 and 5).
    pub fn compute_u(&self, key: &[u8], doc_id: &[u8]) -> Result<Vec<u8>> {
        if self.r == 2 {
            return rc4(key, &PASSWORD_PADDING);
        }
        let mut context = md5::Context::new();
        context.consume(PASSWORD_PADDING);
        context.consume(doc_id);
        let mut result = rc4(key, &context.finalize().0)?;
        for round in 1..20u8 {
            result = rc4(&xor_key(key, round), &result)?;
        }
        result.extend_from_slice(&PASSWORD_PADDING[..16]);
        Ok(result)
    }

    /// RC4 key derived from the owner password (Algorithm 3, steps a-d).
    fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5::compute(pad_password(owner_password)).0;
        if self.r >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        digest[..self.file_key_len()].to_vec()
    }

    /// Compute the `/O` value (Algorithm 3). An empty owner password falls
    /// back to the user password.
    pub fn compute_o(&self, user_password: &[u8], owner_password: &[u8]) -> Result<Vec<u8>> {
        let owner = if owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };
        let key = self.owner_key(owner);
        let mut result = rc4(&key, &pad_password(user_password))?;
        if self.r >= 3 {
            for round in 1..20u8 {
                result = rc4(&xor_key(&key, round), &result)?;
            }
        }
        Ok(result)
    }

    /// Fill in `/O` and `/U` for the given passwords.
    pub fn compute_entries(
        &mut self,
        user_password: &[u8],
        owner_password: &[u8],
        doc_id: &[u8],
    ) -> Result<()> {
        self.o = self.compute_o(user_password, owner_password)?;
        let key = self.compute_key(user_password, doc_id);
        self.u = self.compute_u(&key, doc_id)?;
        Ok(())
    }

    /// Algorithm 6: the file key if `password` is the user password.
    fn authenticate_user(&self, password: &[u8], doc_id: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.compute_key(password, doc_id);
        let computed = self.compute_u(&key, doc_id)?;
        let n = if self.r == 2 { 32 } else { 16 };
        let matched = computed.get(..n).is_some_and(|c| self.u.get(..n) == Some(c));
        Ok(matched.then_some(key))
    }

    /// Algorithm 7: recover the user password from `/O` and check it.
    fn authenticate_owner(&self, password: &[u8], doc_id: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.owner_key(password);
        let user_password = if self.r == 2 {
            rc4(&key, &self.o)?
        } else {
            let mut data = self.o.clone();
            for round in (0..20u8).rev() {
                data = rc4(&xor_key(&key, round), &data)?;
            }
            data
        };
        self.authenticate_user(&user_password, doc_id)
    }

    /// Try `password` as user then owner password.
    pub fn authenticate(
        &self,
        password: &[u8],
        doc_id: &[u8],
    ) -> Result<Option<(PasswordType, Vec<u8>)>> {
        if let Some(key) = self.authenticate_user(password, doc_id)? {
            return Ok(Some((PasswordType::User, key)));
        }
        Ok(self
            .authenticate_owner(password, doc_id)?
            .map(|key| (PasswordType::Owner, key)))
    }

    /// Method for a stream, honoring `/Crypt` filters, embedded files and
    /// unencrypted metadata.
    pub fn stream_method(&self, attrs: &PDFDict) -> CryptMethod {
        let is_type = |kind: &str| matches!(attrs.get("Type"), Some(PDFObject::Name(n)) if n == kind);
        if is_type("XRef") || (is_type("Metadata") && !self.encrypt_metadata) {
            return CryptMethod::Identity;
        }
        if let Some(idx) = crypt_filter_index(attrs) {
            let parms = match attrs.get("DecodeParms") {
                Some(PDFObject::Array(items)) => items.get(idx),
                other => other,
            };
            let name = parms
                .and_then(|p| p.as_dict().ok())
                .and_then(|p| p.get("Name"))
                .and_then(|n| n.as_name().ok())
                .unwrap_or("Identity");
            return match name {
                "Identity" => CryptMethod::Identity,
                other => self
                    .crypt_filters
                    .get(other)
                    .copied()
                    .unwrap_or(self.stm_method),
            };
        }
        if is_type("EmbeddedFile") {
            return self.ef_method;
        }
        self.stm_method
    }
}

/// Position of `/Crypt` in a stream's filter chain.
fn crypt_filter_index(attrs: &PDFDict) -> Option<usize> {
    match attrs.get("Filter")? {
        PDFObject::Name(name) if name == "Crypt" => Some(0),
        PDFObject::Array(items) => items
            .iter()
            .position(|f| matches!(f, PDFObject::Name(n) if n == "Crypt")),
        _ => None,
    }
}

const fn method_name(method: CryptMethod) -> &'static str {
    match method {
        CryptMethod::Identity => "None",
        CryptMethod::Rc4 => "V2",
        CryptMethod::AesV2 => "AESV2",
    }
}

fn crypt_method(name: &str, filter: &PDFDict) -> Result<CryptMethod> {
    let cfm = filter
        .get("CFM")
        .and_then(|v| v.as_name().ok())
        .unwrap_or("None");
    match cfm {
        "None" => Ok(CryptMethod::Identity),
        "V2" => Ok(CryptMethod::Rc4),
        "AESV2" => Ok(CryptMethod::AesV2),
        "AESV3" => Err(PdfError::EncryptionUnsupported(format!(
            "AES-256 crypt filter /{name}"
        ))),
        other => Err(PdfError::EncryptionUnsupported(format!(
            "crypt filter method /{other}"
        ))),
    }
}

/// Per-document security state.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    params: EncryptionParams,
    doc_id: Vec<u8>,
    /// File key; `Some` once unlocked.
    key: Option<Vec<u8>>,
}

impl StandardSecurityHandler {
    pub const fn new(params: EncryptionParams, doc_id: Vec<u8>) -> Self {
        Self {
            params,
            doc_id,
            key: None,
        }
    }

    /// Build a locked handler from an `/Encrypt` dictionary and the first
    /// element of the trailer `/ID`.
    pub fn from_encrypt_dict(dict: &PDFDict, doc_id: Vec<u8>) -> Result<Self> {
        Ok(Self::new(EncryptionParams::from_dict(dict)?, doc_id))
    }

    /// Handler that is already unlocked with a known file key.
    pub const fn with_key(params: EncryptionParams, doc_id: Vec<u8>, key: Vec<u8>) -> Self {
        Self {
            params,
            doc_id,
            key: Some(key),
        }
    }

    pub const fn params(&self) -> &EncryptionParams {
        &self.params
    }

    pub const fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    pub fn file_key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub const fn permissions(&self) -> Permissions {
        self.params.permissions()
    }

    /// Check a password. The first match fixes the file key; later calls
    /// only report whether their password matches.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<Option<PasswordType>> {
        let Some((kind, key)) = self.params.authenticate(password, &self.doc_id)? else {
            tracing::debug!("password matched neither /U nor /O");
            return Ok(None);
        };
        if self.key.is_none() {
            tracing::debug!(?kind, "document unlocked");
            self.key = Some(key);
        }
        Ok(Some(kind))
    }

    /// Per-object key (Algorithm 1): MD5 of file key, object number and
    /// generation, salted for AES.
    pub fn object_key(&self, objref: PDFObjRef, aes: bool) -> Result<Vec<u8>> {
        let key = self.key.as_deref().ok_or(PdfError::DocumentLocked)?;
        let mut context = md5::Context::new();
        context.consume(key);
        context.consume(&objref.objid.to_le_bytes()[..3]);
        context.consume(&objref.genno.to_le_bytes()[..2]);
        if aes {
            context.consume(AES_SALT);
        }
        let n = (key.len() + 5).min(16);
        Ok(context.finalize().0[..n].to_vec())
    }

    fn decrypt_with(&self, method: CryptMethod, objref: PDFObjRef, data: &[u8]) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => rc4(&self.object_key(objref, false)?, data),
            CryptMethod::AesV2 => aes_decrypt_with_iv(&self.object_key(objref, true)?, data),
        }
    }

    fn encrypt_with(
        &self,
        method: CryptMethod,
        objref: PDFObjRef,
        data: &[u8],
        iv: &[u8; AES_BLOCK],
    ) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => rc4(&self.object_key(objref, false)?, data),
            CryptMethod::AesV2 => aes_encrypt_with_iv(&self.object_key(objref, true)?, iv, data),
        }
    }

    pub fn decrypt_string(&self, objref: PDFObjRef, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with(self.params.str_method, objref, data)
    }

    pub fn decrypt_stream(&self, objref: PDFObjRef, stream: &PDFStream) -> Result<Vec<u8>> {
        let method = self.params.stream_method(&stream.attrs);
        self.decrypt_with(method, objref, stream.get_rawdata())
    }

    /// Encrypt string bytes. `iv` is only used by AES.
    pub fn encrypt_string(
        &self,
        objref: PDFObjRef,
        data: &[u8],
        iv: &[u8; AES_BLOCK],
    ) -> Result<Vec<u8>> {
        self.encrypt_with(self.params.str_method, objref, data, iv)
    }

    /// Encrypt stream payload bytes for a stream with dictionary `attrs`.
    pub fn encrypt_stream(
        &self,
        objref: PDFObjRef,
        attrs: &PDFDict,
        data: &[u8],
        iv: &[u8; AES_BLOCK],
    ) -> Result<Vec<u8>> {
        let method = self.params.stream_method(attrs);
        self.encrypt_with(method, objref, data, iv)
    }
}

fn get_int(dict: &PDFDict, key: &str) -> Result<i64> {
    dict.get(key)
        .ok_or_else(|| PdfError::KeyError(key.to_string()))?
        .as_int()
}

fn get_int_default(dict: &PDFDict, key: &str, default: i64) -> i64 {
    dict.get(key).and_then(|v| v.as_int().ok()).unwrap_or(default)
}

fn get_bytes(dict: &PDFDict, key: &str) -> Result<Vec<u8>> {
    dict.get(key)
        .ok_or_else(|| PdfError::KeyError(key.to_string()))?
        .as_bytes()
        .map(<[u8]>::to_vec)
}

fn get_name_default<'a>(dict: &'a PDFDict, key: &str, default: &'a str) -> &'a str {
    dict.get(key).and_then(|v| v.as_name().ok()).unwrap_or(default)
}
