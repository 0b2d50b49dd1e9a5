//! JSON bodies sent to the render process to add, update, remove, clear or
//! reorder effects. Only the shapes live here; the pipe transport does not.
//!
//! Every message serializes with a `MessageType` discriminator and a
//! `Timestamp` in .NET ticks (100 ns units since 0001-01-01) of the sender's
//! local wall-clock time:
//!
//! ```json
//! {"MessageType":"RemoveEffectMessage","ID":"aurora-01","Timestamp":638501472000000000}
//! ```
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::package::{EffectPackage, ImageResources};
use crate::parameter::{EffectParameter, ParamType, ParamValue};

/// Coordinates above this are left out of the image grid.
pub const MAX_GRID_DIMENSION: usize = 64;

/// `ImageData[x - 1][y - 1]` holds the bytes of `image{x}_{y}.*`.
pub type ImageGrid = Vec<Vec<Option<Vec<u8>>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterMessage {
    #[serde(rename = "PassID")]
    pub pass_id: i32,
    #[serde(rename = "Type")]
    pub ty: ParamType,
    pub name: String,
    pub value: ParamValue,
}

impl ParameterMessage {
    /// Same parameter carrying a new value.
    pub fn with_value(mut self, value: ParamValue) -> Self {
        self.value = value;
        self
    }
}

impl From<&EffectParameter> for ParameterMessage {
    fn from(parameter: &EffectParameter) -> Self {
        Self {
            pass_id: parameter.pass_id,
            ty: parameter.ty.clone(),
            name: parameter.name.clone(),
            value: parameter.default_value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddEffect {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "HLSLCode")]
    pub hlsl_code: Vec<String>,
    pub parameter: Vec<ParameterMessage>,
    #[serde(serialize_with = "serialize_grid")]
    pub image_data: ImageGrid,
}

impl AddEffect {
    pub fn from_package(package: &EffectPackage) -> Self {
        let message = Self {
            id: package.metadata().id.clone(),
            hlsl_code: package.passes(),
            parameter: package
                .parameters()
                .iter()
                .map(ParameterMessage::from)
                .collect(),
            image_data: image_grid(package.images()),
        };
        debug!(
            id = %message.id,
            passes = message.hlsl_code.len(),
            parameters = message.parameter.len(),
            "built add-effect message"
        );
        message
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateEffectParameter {
    #[serde(rename = "ID")]
    pub id: String,
    pub parameter: ParameterMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveEffect {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortEffects {
    #[serde(rename = "IDs")]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "MessageType")]
pub enum EffectMessage {
    #[serde(rename = "AddEffectMessage")]
    AddEffect(AddEffect),
    #[serde(rename = "UpdateEffectParameterMessage")]
    UpdateEffectParameter(UpdateEffectParameter),
    #[serde(rename = "RemoveEffectMessage")]
    RemoveEffect(RemoveEffect),
    #[serde(rename = "ClearEffectsMessage")]
    ClearEffects,
    #[serde(rename = "SortEffectsMessage")]
    SortEffects(SortEffects),
}

impl EffectMessage {
    pub fn remove(id: impl Into<String>) -> Self {
        Self::RemoveEffect(RemoveEffect { id: id.into() })
    }

    pub fn sort<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SortEffects(SortEffects {
            ids: ids.into_iter().map(Into::into).collect(),
        })
    }

    pub fn update(id: impl Into<String>, parameter: ParameterMessage) -> Self {
        Self::UpdateEffectParameter(UpdateEffectParameter {
            id: id.into(),
            parameter,
        })
    }

    /// Stamps the message with the wall-clock time of `at` in its own zone,
    /// so `Local::now()` gives what the render process expects.
    pub fn stamped<Tz: TimeZone>(self, at: DateTime<Tz>) -> Envelope {
        Envelope {
            message: self,
            timestamp: dotnet_ticks(&at),
        }
    }
}

impl From<AddEffect> for EffectMessage {
    fn from(message: AddEffect) -> Self {
        Self::AddEffect(message)
    }
}

/// A message with its send time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: EffectMessage,
    /// .NET ticks: 100 ns units since 0001-01-01T00:00:00 wall-clock time.
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

impl Envelope {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Ticks between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

fn dotnet_ticks<Tz: TimeZone>(at: &DateTime<Tz>) -> i64 {
    let wall = at.naive_local().and_utc();
    UNIX_EPOCH_TICKS
        + wall.timestamp() * TICKS_PER_SECOND
        + i64::from(wall.timestamp_subsec_nanos() / 100)
}

/// Parses `image{x}_{y}` from a file name, ignoring the extension. Both
/// coordinates are 1-based.
pub fn parse_grid_name(name: &str) -> Option<(usize, usize)> {
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    let prefix = stem.get(..5)?;
    if !prefix.eq_ignore_ascii_case("image") {
        return None;
    }
    let (x, y) = stem[5..].split_once('_')?;
    let x: usize = x.parse().ok()?;
    let y: usize = y.parse().ok()?;
    (x >= 1 && y >= 1).then_some((x, y))
}

/// Arranges images named `image{x}_{y}` into a grid sized by the largest
/// coordinates present. Other names, and placeholders, are left out.
pub fn image_grid(images: &ImageResources) -> ImageGrid {
    let cells: Vec<(usize, usize, &[u8])> = images
        .iter()
        .filter_map(|(name, data)| {
            let (x, y) = parse_grid_name(name)?;
            if x > MAX_GRID_DIMENSION || y > MAX_GRID_DIMENSION {
                warn!(name, "image grid coordinate out of range; skipping");
                return None;
            }
            Some((x, y, data))
        })
        .collect();

    let width = cells.iter().map(|(x, _, _)| *x).max().unwrap_or(0);
    let height = cells.iter().map(|(_, y, _)| *y).max().unwrap_or(0);
    let mut grid = vec![vec![None; height]; width];
    for (x, y, data) in cells {
        grid[x - 1][y - 1] = Some(data.to_vec());
    }
    grid
}

fn serialize_grid<S: Serializer>(grid: &ImageGrid, serializer: S) -> Result<S::Ok, S::Error> {
    let encoded: Vec<Vec<Option<String>>> = grid
        .iter()
        .map(|column| {
            column
                .iter()
                .map(|cell| {
                    cell.as_ref()
                        .map(|bytes| general_purpose::STANDARD.encode(bytes))
                })
                .collect()
        })
        .collect();
    encoded.serialize(serializer)
}
