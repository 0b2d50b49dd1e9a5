mod crypto;
mod diagnostics;
mod format;
mod message;
mod metadata;
mod package;
mod parameter;
mod paramlang;
mod project;

pub use crypto::{DecryptError, PackageKey};
pub use diagnostics::{Diagnostic, Severity};
pub use format::{
    join_passes, split_passes, BlockTag, CURRENT_VERSION, HEADER_SIZE, MAX_METADATA_LEN,
    PACKAGE_EXTENSION, PASS_SEPARATOR,
};
pub use message::{
    image_grid, parse_grid_name, AddEffect, EffectMessage, Envelope, ImageGrid, ParameterMessage,
    RemoveEffect, SortEffects, UpdateEffectParameter,
};
pub use metadata::EffectMetadata;
pub use package::{
    EffectPackage, EffectPackager, EncodeJob, EncodeReport, EncodeRequest, ErrorKind, ImageEntry,
    ImageResources, PackageError, PackageHeader, PendingEncode,
};
pub use parameter::{EffectParameter, ParamType, ParamValue, ScalarKind};
pub use paramlang::{LineError, ParamParser, ParseOutcome, ParsedLine};
pub use project::{EffectProject, ProjectError, ProjectManifest, ProjectPass, PROJECT_FILE};
