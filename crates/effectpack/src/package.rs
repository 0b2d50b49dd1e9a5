//! Reads and writes `.xcpe` effect packages.
//!
//! Types:
//!
//! - `PackageError` classifies every way a package can fail to encode or
//!   decode; `ErrorKind` groups those failures for callers that only need to
//!   tell corruption from a wrong key or an I/O problem.
//! - `ImageResources` holds decoded images by file name, unique without
//!   regard to case, in the order they were stored.
//! - `EffectPackage` is a fully decoded package.
//! - `PackageHeader` is the fixed header on its own, for callers that only
//!   want to identify or verify a file.
//! - `EncodeRequest` borrows the inputs of one encode; `EncodeJob` owns them
//!   so the encode can move to a worker thread.
//! - `EncodeReport` describes what was written, including the warnings raised
//!   for images that could not be read.
//!
//! Functions:
//!
//! - `EffectPackager::encode` writes a package and back-fills its hash.
//! - `EffectPackager::decode` verifies and decodes a whole package.
//! - `EffectPackager::read_parameters_only` reads only the parameter block.
//! - `EffectPackager::encode_in_background` runs an encode on a worker thread
//!   and returns a `PendingEncode` handle.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::crypto::PackageKey;
use crate::diagnostics::Diagnostic;
use crate::format::{
    self, checked_len, push_len, BlockTag, ByteReader, ReadFault, CURRENT_VERSION,
    FILE_LENGTH_OFFSET, HASH_LEN, HASH_OFFSET, HASH_START, HEADER_SIZE, MAX_METADATA_LEN,
    METADATA_OFFSET, PACKAGE_EXTENSION, SIGNATURE,
};
use crate::metadata::EffectMetadata;
use crate::parameter::EffectParameter;

/// Coarse grouping of `PackageError` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes do not follow the package layout.
    Format,
    /// The content hash or stored length does not match the file.
    Integrity,
    /// Decryption failed; usually a wrong key.
    Crypto,
    Io,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("package not found at {0}")]
    NotFound(PathBuf),

    #[error("not an effect package (bad signature)")]
    BadSignature,

    #[error("unsupported package version {0}")]
    UnsupportedVersion(i32),

    #[error("expected {expected} block at offset {offset}, found tag {found}")]
    UnexpectedBlock {
        expected: BlockTag,
        found: u8,
        offset: u64,
    },

    #[error("package truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("invalid {what} length {length} at offset {offset}")]
    InvalidLength {
        what: &'static str,
        length: i64,
        offset: u64,
    },

    #[error("{what} of {length} bytes does not fit a 32-bit length field")]
    BlockTooLarge { what: &'static str, length: usize },

    #[error("stored file length {stored} does not match actual length {actual}")]
    LengthMismatch { stored: i64, actual: u64 },

    #[error("end-of-file marker missing")]
    MissingEndMarker,

    #[error("{0} unexpected bytes after the end-of-file marker")]
    TrailingData(usize),

    #[error("metadata JSON is {length} bytes but at most {max} fit in the header")]
    HeaderOverflow { length: usize, max: usize },

    #[error("invalid metadata: {0}")]
    Metadata(#[source] serde_json::Error),

    #[error("invalid parameter block: {0}")]
    Parameters(#[source] serde_json::Error),

    #[error("parameter '{name}' cannot be stored: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("{what} is not valid UTF-8{}", encryption_hint(.maybe_encrypted))]
    InvalidText {
        what: &'static str,
        maybe_encrypted: bool,
    },

    #[error("content hash mismatch: the package is corrupted or was modified")]
    IntegrityMismatch {
        stored: [u8; HASH_LEN],
        computed: [u8; HASH_LEN],
    },

    #[error("could not decrypt {0}: wrong key or corrupted data")]
    WrongKey(&'static str),

    #[error("encode cancelled before the output file was created")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::Io(_) => ErrorKind::Io,
            Self::IntegrityMismatch { .. } | Self::LengthMismatch { .. } => ErrorKind::Integrity,
            Self::WrongKey(_) => ErrorKind::Crypto,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::BadSignature
            | Self::UnsupportedVersion(_)
            | Self::UnexpectedBlock { .. }
            | Self::Truncated { .. }
            | Self::InvalidLength { .. }
            | Self::BlockTooLarge { .. }
            | Self::MissingEndMarker
            | Self::TrailingData(_)
            | Self::HeaderOverflow { .. }
            | Self::Metadata(_)
            | Self::Parameters(_)
            | Self::InvalidParameter { .. }
            | Self::InvalidText { .. } => ErrorKind::Format,
        }
    }
}

impl From<ReadFault> for PackageError {
    fn from(fault: ReadFault) -> Self {
        match fault {
            ReadFault::Truncated {
                offset,
                needed,
                available,
            } => Self::Truncated {
                offset,
                needed,
                available,
            },
            ReadFault::InvalidLength {
                what,
                length,
                offset,
            } => Self::InvalidLength {
                what,
                length,
                offset,
            },
        }
    }
}

fn encryption_hint(maybe_encrypted: &bool) -> &'static str {
    if *maybe_encrypted {
        " (the package may be encrypted; supply a key)"
    } else {
        ""
    }
}

fn open_error(path: &Path, err: io::Error) -> PackageError {
    if err.kind() == io::ErrorKind::NotFound {
        PackageError::NotFound(path.to_path_buf())
    } else {
        PackageError::Io(err)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Image files keyed by file name. Names compare without regard to case and
/// insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageResources {
    entries: Vec<(String, Vec<u8>)>,
}

impl ImageResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `name`, replacing and returning the bytes of an
    /// entry whose name matches. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) -> Option<Vec<u8>> {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| same_name(existing, &name))
        {
            Some(entry) => Some(std::mem::replace(&mut entry.1, data)),
            None => {
                self.entries.push((name, data));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(existing, _)| same_name(existing, name))
            .map(|(_, data)| data.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

/// Fixed header fields of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    pub version: i32,
    pub hash: [u8; HASH_LEN],
    pub file_length: i64,
    pub metadata: EffectMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectPackage {
    header: PackageHeader,
    shader_code: String,
    images: ImageResources,
    parameters: Vec<EffectParameter>,
}

impl EffectPackage {
    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn metadata(&self) -> &EffectMetadata {
        &self.header.metadata
    }

    pub fn hash(&self) -> &[u8; HASH_LEN] {
        &self.header.hash
    }

    /// All passes joined by the pass separator.
    pub fn shader_code(&self) -> &str {
        &self.shader_code
    }

    pub fn passes(&self) -> Vec<String> {
        format::split_passes(&self.shader_code)
    }

    pub fn images(&self) -> &ImageResources {
        &self.images
    }

    pub fn parameters(&self) -> &[EffectParameter] {
        &self.parameters
    }

    pub fn parameters_for_pass(&self, pass_id: i32) -> impl Iterator<Item = &EffectParameter> {
        self.parameters
            .iter()
            .filter(move |parameter| parameter.pass_id == pass_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub metadata: &'a EffectMetadata,
    /// Pass sources already joined with the pass separator.
    pub shader_code: &'a str,
    pub image_paths: &'a [PathBuf],
    pub parameters: &'a [EffectParameter],
    pub key: Option<&'a PackageKey>,
}

/// Owned encode inputs that can be sent to a worker thread.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub metadata: EffectMetadata,
    pub shader_code: String,
    pub image_paths: Vec<PathBuf>,
    pub parameters: Vec<EffectParameter>,
    pub key: Option<PackageKey>,
}

impl EncodeJob {
    pub fn as_request(&self) -> EncodeRequest<'_> {
        EncodeRequest {
            metadata: &self.metadata,
            shader_code: &self.shader_code,
            image_paths: &self.image_paths,
            parameters: &self.parameters,
            key: self.key.as_ref(),
        }
    }
}

/// One entry written to the image block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub source: PathBuf,
    /// Stored file name; empty for a placeholder.
    pub name: String,
    /// Stored byte count, after encryption.
    pub stored_len: usize,
}

impl ImageEntry {
    pub fn is_placeholder(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    pub path: PathBuf,
    pub file_length: u64,
    pub hash: [u8; HASH_LEN],
    pub images: Vec<ImageEntry>,
    pub encrypted: bool,
    pub warnings: Vec<Diagnostic>,
}

/// Handle to an encode running on a worker thread.
#[derive(Debug)]
pub struct PendingEncode {
    receiver: Receiver<Result<EncodeReport, PackageError>>,
    cancel: Arc<AtomicBool>,
}

impl PendingEncode {
    /// Requests cancellation. Has no effect once the output file exists.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Returns the result if the worker has finished.
    pub fn poll(&self) -> Option<Result<EncodeReport, PackageError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    pub fn wait(self) -> Result<EncodeReport, PackageError> {
        self.receiver.recv().unwrap_or_else(|_| Err(worker_lost()))
    }
}

fn worker_lost() -> PackageError {
    PackageError::Io(io::Error::new(
        io::ErrorKind::Other,
        "encode worker exited before returning a result",
    ))
}

/// Stateless package reader/writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectPackager;

impl EffectPackager {
    pub fn new() -> Self {
        Self
    }

    /// `dir/<name>.xcpe`
    pub fn package_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
        dir.as_ref().join(format!("{name}.{PACKAGE_EXTENSION}"))
    }

    pub fn encode(
        &self,
        request: EncodeRequest<'_>,
        output: impl AsRef<Path>,
    ) -> Result<EncodeReport, PackageError> {
        self.encode_with_cancel(request, output.as_ref(), &AtomicBool::new(false))
    }

    pub fn encode_in_background(&self, job: EncodeJob, output: PathBuf) -> PendingEncode {
        let packager = *self;
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            let result = packager.encode_with_cancel(job.as_request(), &output, &worker_cancel);
            let _ = sender.send(result);
        });

        PendingEncode { receiver, cancel }
    }

    pub(crate) fn encode_with_cancel(
        &self,
        request: EncodeRequest<'_>,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<EncodeReport, PackageError> {
        for parameter in request.parameters {
            parameter
                .validate()
                .map_err(|reason| PackageError::InvalidParameter {
                    name: parameter.name.clone(),
                    reason,
                })?;
        }
        let metadata_json = serde_json::to_vec(request.metadata).map_err(PackageError::Metadata)?;
        let header =
            format::build_header(&metadata_json).ok_or(PackageError::HeaderOverflow {
                length: metadata_json.len(),
                max: MAX_METADATA_LEN,
            })?;

        let mut data = Vec::new();

        let parameters_json =
            serde_json::to_vec(request.parameters).map_err(PackageError::Parameters)?;
        data.push(BlockTag::Parameters.as_byte());
        push_block(&mut data, "parameter block", &parameters_json)?;

        let shader = request.shader_code.as_bytes();
        let shader = match request.key {
            Some(key) => key.encrypt(shader),
            None => shader.to_vec(),
        };
        data.push(BlockTag::ShaderCode.as_byte());
        push_block(&mut data, "shader code", &shader)?;

        let (images, warnings) = gather_images(request.image_paths, request.key);
        data.push(BlockTag::ImageResources.as_byte());
        push_len(&mut data, images.len()).ok_or(PackageError::BlockTooLarge {
            what: "image count",
            length: images.len(),
        })?;
        let mut entries = Vec::with_capacity(images.len());
        for image in images {
            push_block(&mut data, "image name", image.name.as_bytes())?;
            push_block(&mut data, "image data", &image.data)?;
            entries.push(ImageEntry {
                source: image.source,
                name: image.name,
                stored_len: image.data.len(),
            });
        }
        data.push(BlockTag::EndOfFile.as_byte());

        if cancel.load(Ordering::SeqCst) {
            debug!(path = %output.display(), "encode cancelled before writing");
            return Err(PackageError::Cancelled);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(output)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header)?;
        writer.write_all(&data)?;
        writer.flush()?;
        let mut file = writer.into_inner().map_err(|err| err.into_error())?;

        let (file_length, hash) = seal(&mut file)?;
        file.sync_all()?;

        info!(
            path = %output.display(),
            bytes = file_length,
            images = entries.len(),
            encrypted = request.key.is_some(),
            "wrote effect package"
        );

        Ok(EncodeReport {
            path: output.to_path_buf(),
            file_length,
            hash,
            images: entries,
            encrypted: request.key.is_some(),
            warnings,
        })
    }

    pub fn decode(
        &self,
        path: impl AsRef<Path>,
        key: Option<&PackageKey>,
    ) -> Result<EffectPackage, PackageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| open_error(path, err))?;
        debug!(path = %path.display(), bytes = bytes.len(), "decoding effect package");
        self.decode_bytes(&bytes, key)
    }

    pub fn decode_bytes(
        &self,
        bytes: &[u8],
        key: Option<&PackageKey>,
    ) -> Result<EffectPackage, PackageError> {
        let header = verify_bytes(bytes)?;

        let mut reader = ByteReader::at(bytes, HEADER_SIZE);

        expect_tag(&mut reader, BlockTag::Parameters)?;
        let parameters_json = reader.read_prefixed("parameter block")?;
        let parameters: Vec<EffectParameter> =
            serde_json::from_slice(parameters_json).map_err(PackageError::Parameters)?;

        expect_tag(&mut reader, BlockTag::ShaderCode)?;
        let shader = reader.read_prefixed("shader code")?;
        let shader_code = match key {
            Some(key) => {
                let plain = key
                    .decrypt(shader)
                    .map_err(|_| PackageError::WrongKey("shader code"))?;
                String::from_utf8(plain).map_err(|_| PackageError::WrongKey("shader code"))?
            }
            None => String::from_utf8(shader.to_vec()).map_err(|_| PackageError::InvalidText {
                what: "shader code",
                maybe_encrypted: true,
            })?,
        };

        expect_tag(&mut reader, BlockTag::ImageResources)?;
        let images = read_images(&mut reader, key)?;

        if reader.remaining() == 0 {
            return Err(PackageError::MissingEndMarker);
        }
        expect_tag(&mut reader, BlockTag::EndOfFile)?;
        if reader.remaining() > 0 {
            return Err(PackageError::TrailingData(reader.remaining()));
        }

        debug!(
            id = %header.metadata.id,
            parameters = parameters.len(),
            images = images.len(),
            "decoded effect package"
        );

        Ok(EffectPackage {
            header,
            shader_code,
            images,
            parameters,
        })
    }

    /// Reads and parses the fixed header without touching the data section.
    pub fn read_header(&self, path: impl AsRef<Path>) -> Result<PackageHeader, PackageError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| open_error(path, err))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        file.take(HEADER_SIZE as u64).read_to_end(&mut bytes)?;
        parse_header(&bytes)
    }

    /// Checks signature, version, stored length and content hash without
    /// decoding the data section.
    pub fn verify(&self, path: impl AsRef<Path>) -> Result<PackageHeader, PackageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| open_error(path, err))?;
        verify_bytes(&bytes)
    }

    /// Reads the parameter block only. Skips the content hash check and
    /// never reads the shader or image blocks.
    pub fn read_parameters_only(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<EffectParameter>, PackageError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|err| open_error(path, err))?;
        let file_length = file.metadata()?.len();

        let mut prefix = Vec::with_capacity(METADATA_OFFSET);
        (&mut file)
            .take(METADATA_OFFSET as u64)
            .read_to_end(&mut prefix)?;
        check_signature(&prefix)?;
        if prefix.len() < METADATA_OFFSET {
            return Err(PackageError::Truncated {
                offset: 0,
                needed: METADATA_OFFSET,
                available: prefix.len(),
            });
        }
        let mut reader = ByteReader::at(&prefix, HASH_START);
        let metadata_len = i64::from(reader.read_i32()?);
        checked_len("metadata", metadata_len, HASH_START as u64, MAX_METADATA_LEN)?;

        if file_length < HEADER_SIZE as u64 + 5 {
            return Err(PackageError::Truncated {
                offset: HEADER_SIZE as u64,
                needed: 5,
                available: file_length.saturating_sub(HEADER_SIZE as u64) as usize,
            });
        }
        file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut block_header = [0u8; 5];
        file.read_exact(&mut block_header)?;
        if block_header[0] != BlockTag::Parameters.as_byte() {
            return Err(PackageError::UnexpectedBlock {
                expected: BlockTag::Parameters,
                found: block_header[0],
                offset: HEADER_SIZE as u64,
            });
        }
        let mut length = [0u8; 4];
        length.copy_from_slice(&block_header[1..]);
        let remaining = file_length - (HEADER_SIZE as u64 + 5);
        let length = checked_len(
            "parameter block",
            i64::from(i32::from_le_bytes(length)),
            HEADER_SIZE as u64 + 1,
            usize::try_from(remaining).unwrap_or(usize::MAX),
        )?;

        let mut json = vec![0u8; length];
        file.read_exact(&mut json)?;
        let parameters: Vec<EffectParameter> =
            serde_json::from_slice(&json).map_err(PackageError::Parameters)?;
        debug!(path = %path.display(), count = parameters.len(), "read parameter block");
        Ok(parameters)
    }
}

struct GatheredImage {
    source: PathBuf,
    name: String,
    data: Vec<u8>,
}

fn gather_images(
    paths: &[PathBuf],
    key: Option<&PackageKey>,
) -> (Vec<GatheredImage>, Vec<Diagnostic>) {
    let mut images: Vec<GatheredImage> = Vec::with_capacity(paths.len());
    let mut warnings = Vec::new();
    for path in paths {
        let subject = path.display().to_string();
        let file_name = path.file_name();
        let name = file_name
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if file_name.is_some_and(|name| name.to_str().is_none()) {
            warn!(path = %subject, stored = %name, "image file name is not valid UTF-8");
            warnings.push(Diagnostic::warning(
                subject.clone(),
                format!("image file name is not valid UTF-8; stored as '{name}'"),
            ));
        }
        let read = if name.is_empty() {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
        } else {
            fs::read(path)
        };
        match read {
            Ok(bytes) => {
                if images.iter().any(|image| same_name(&image.name, &name)) {
                    warn!(path = %subject, "duplicate image name; the later entry wins on decode");
                    warnings.push(Diagnostic::warning(
                        subject.clone(),
                        format!("duplicate image name '{name}'"),
                    ));
                }
                let data = match key {
                    Some(key) => key.encrypt(&bytes),
                    None => bytes,
                };
                images.push(GatheredImage {
                    source: path.clone(),
                    name,
                    data,
                });
            }
            Err(err) => {
                warn!(path = %subject, error = %err, "image unavailable; writing placeholder");
                warnings.push(Diagnostic::warning(
                    subject,
                    format!("image unavailable, stored as placeholder: {err}"),
                ));
                images.push(GatheredImage {
                    source: path.clone(),
                    name: String::new(),
                    data: Vec::new(),
                });
            }
        }
    }
    (images, warnings)
}

fn push_block(buf: &mut Vec<u8>, what: &'static str, bytes: &[u8]) -> Result<(), PackageError> {
    push_len(buf, bytes.len()).ok_or(PackageError::BlockTooLarge {
        what,
        length: bytes.len(),
    })?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Hashes bytes `[HASH_START..]` of a freshly written file and writes the
/// hash and total length into the header.
fn seal(file: &mut File) -> Result<(u64, [u8; HASH_LEN]), PackageError> {
    let file_length = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(HASH_START as u64))?;
    let mut hasher = Sha256::new();
    io::copy(file, &mut hasher)?;
    let hash: [u8; HASH_LEN] = hasher.finalize().into();

    let stored_length = i64::try_from(file_length).map_err(|_| PackageError::BlockTooLarge {
        what: "package",
        length: usize::MAX,
    })?;
    file.seek(SeekFrom::Start(HASH_OFFSET as u64))?;
    file.write_all(&hash)?;
    file.seek(SeekFrom::Start(FILE_LENGTH_OFFSET as u64))?;
    file.write_all(&stored_length.to_le_bytes())?;
    Ok((file_length, hash))
}

fn check_signature(bytes: &[u8]) -> Result<(), PackageError> {
    if bytes.get(..SIGNATURE.len()) != Some(&SIGNATURE[..]) {
        return Err(PackageError::BadSignature);
    }
    let mut reader = ByteReader::at(bytes, SIGNATURE.len());
    let version = reader.read_i32()?;
    if version != CURRENT_VERSION {
        return Err(PackageError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Signature, version, stored hash and stored length. Nothing after the
/// length field is interpreted here.
fn header_fields(bytes: &[u8]) -> Result<([u8; HASH_LEN], i64), PackageError> {
    check_signature(bytes)?;
    if bytes.len() < HEADER_SIZE {
        return Err(PackageError::Truncated {
            offset: 0,
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let mut hash = [0u8; HASH_LEN];
    hash.copy_from_slice(&bytes[HASH_OFFSET..HASH_OFFSET + HASH_LEN]);
    let file_length = ByteReader::at(bytes, FILE_LENGTH_OFFSET).read_i64()?;
    Ok((hash, file_length))
}

fn parse_metadata(bytes: &[u8]) -> Result<EffectMetadata, PackageError> {
    let mut reader = ByteReader::at(&bytes[..HEADER_SIZE], HASH_START);
    let metadata_len = i64::from(reader.read_i32()?);
    let metadata_len = checked_len("metadata", metadata_len, HASH_START as u64, MAX_METADATA_LEN)?;
    let metadata_json = reader.take(metadata_len)?;
    serde_json::from_slice(metadata_json).map_err(PackageError::Metadata)
}

fn parse_header(bytes: &[u8]) -> Result<PackageHeader, PackageError> {
    let (hash, file_length) = header_fields(bytes)?;
    Ok(PackageHeader {
        version: CURRENT_VERSION,
        hash,
        file_length,
        metadata: parse_metadata(bytes)?,
    })
}

/// Checks the stored length and content hash before any JSON is parsed.
fn verify_bytes(bytes: &[u8]) -> Result<PackageHeader, PackageError> {
    let (hash, file_length) = header_fields(bytes)?;
    let actual = bytes.len() as u64;
    if u64::try_from(file_length).ok() != Some(actual) {
        return Err(PackageError::LengthMismatch {
            stored: file_length,
            actual,
        });
    }
    let computed: [u8; HASH_LEN] = Sha256::digest(&bytes[HASH_START..]).into();
    if computed != hash {
        warn!(length = actual, "package hash mismatch");
        return Err(PackageError::IntegrityMismatch {
            stored: hash,
            computed,
        });
    }
    Ok(PackageHeader {
        version: CURRENT_VERSION,
        hash,
        file_length,
        metadata: parse_metadata(bytes)?,
    })
}

fn expect_tag(reader: &mut ByteReader<'_>, expected: BlockTag) -> Result<(), PackageError> {
    let offset = reader.position() as u64;
    let found = reader.read_u8()?;
    if found != expected.as_byte() {
        return Err(PackageError::UnexpectedBlock {
            expected,
            found,
            offset,
        });
    }
    Ok(())
}

fn read_images(
    reader: &mut ByteReader<'_>,
    key: Option<&PackageKey>,
) -> Result<ImageResources, PackageError> {
    let offset = reader.position() as u64;
    let count = i64::from(reader.read_i32()?);
    // each entry carries at least two length fields
    let count = checked_len("image count", count, offset, reader.remaining() / 8)?;

    let mut images = ImageResources::new();
    for _ in 0..count {
        let name = reader.read_prefixed("image name")?;
        let name = std::str::from_utf8(name).map_err(|_| PackageError::InvalidText {
            what: "image name",
            maybe_encrypted: false,
        })?;
        let data = reader.read_prefixed("image data")?;
        let data = match key {
            Some(key) if !data.is_empty() => key
                .decrypt(data)
                .map_err(|_| PackageError::WrongKey("image data"))?,
            _ => data.to_vec(),
        };
        if images.insert(name, data).is_some() {
            debug!(name, "duplicate image name; keeping the later entry");
        }
    }
    Ok(images)
}
