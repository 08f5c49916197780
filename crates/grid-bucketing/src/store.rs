//! Self-describing on-disk format for gridded datasets (Zarr V3).
//!
//! Layout of a store:
//!
//! ```text
//! <path>/
//!   zarr.json        root group, attributes: datacube_format, name, dims,
//!                    variables, plus the dataset's own attributes
//!   lat/  lon/       1-D float64 coordinates
//!   time/            1-D int64 whole seconds since the Unix epoch (optional)
//!   <variable>/      float64 (NaN fill) or int32 class codes (i32::MIN fill)
//! ```
//!
//! Stores are written to a hidden staging directory beside the destination
//! and renamed into place, so a failed write never leaves partial output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs_filesystem::FilesystemStore;

use cube_common::{
    Codebook, DatacubeError, GriddedDataset, Result, Variable, VariableKind, LAT, LON, TIME,
};

use crate::config::{StoreConfig, ZarrCompression};

/// Version of the on-disk layout.
pub const FORMAT_VERSION: u64 = 1;

/// Fill value for categorical arrays.
pub const CATEGORICAL_FILL: i32 = i32::MIN;

const TIME_UNITS: &str = "seconds since 1970-01-01T00:00:00Z";

const RESERVED_ROOT_ATTRS: [&str; 4] = ["datacube_format", "name", "dims", "variables"];
const RESERVED_VARIABLE_ATTRS: [&str; 3] = ["kind", "dimensions", "codebook"];

fn zarr_error(err: impl std::fmt::Display) -> DatacubeError {
    DatacubeError::format(format!("zarr: {}", err))
}

/// Writes datasets as Zarr V3 directory stores.
#[derive(Debug, Clone, Default)]
pub struct DatasetWriter {
    config: StoreConfig,
}

impl DatasetWriter {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Persist `dataset` at `path`, replacing any existing store there.
    ///
    /// The parent directory must already exist.
    pub fn write(&self, dataset: &GriddedDataset, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if dataset.is_empty() {
            return Err(DatacubeError::empty_dataset(format!(
                "refusing to save empty dataset '{}'",
                dataset.name()
            )));
        }
        self.config.validate().map_err(DatacubeError::value)?;
        // The time axis is stored as whole seconds.
        if let Some(t) = dataset
            .time()
            .and_then(|times| times.iter().find(|t| t.timestamp_subsec_nanos() != 0))
        {
            return Err(DatacubeError::value(format!(
                "dataset '{}' has sub-second time {}; stores keep whole seconds",
                dataset.name(),
                t
            )));
        }

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(DatacubeError::io(
                path,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "destination directory does not exist",
                ),
            ));
        }

        let staging = tempfile::Builder::new()
            .prefix(".datacube-")
            .tempdir_in(&parent)
            .map_err(|e| DatacubeError::io(&parent, e))?;
        debug!(staging = %staging.path().display(), "Writing dataset to staging directory");

        self.write_store(dataset, staging.path())?;

        if path.is_dir() {
            fs::remove_dir_all(path).map_err(|e| DatacubeError::io(path, e))?;
        } else if path.exists() {
            fs::remove_file(path).map_err(|e| DatacubeError::io(path, e))?;
        }
        fs::rename(staging.path(), path).map_err(|e| DatacubeError::io(path, e))?;

        info!(
            dataset = dataset.name(),
            path = %path.display(),
            variables = dataset.variables().len(),
            compression = %self.config.compression,
            "Saved dataset"
        );
        Ok(())
    }

    fn write_store(&self, dataset: &GriddedDataset, dir: &Path) -> Result<()> {
        let store = Arc::new(FilesystemStore::new(dir).map_err(zarr_error)?);

        let dims: Vec<&str> = if dataset.time().is_some() {
            vec![TIME, LAT, LON]
        } else {
            vec![LAT, LON]
        };

        let mut root_attrs = Map::new();
        for (key, value) in dataset.attrs() {
            root_attrs.insert(key.clone(), value.clone());
        }
        root_attrs.insert("datacube_format".to_string(), json!(FORMAT_VERSION));
        root_attrs.insert("name".to_string(), json!(dataset.name()));
        root_attrs.insert("dims".to_string(), json!(dims));
        root_attrs.insert("variables".to_string(), json!(dataset.variable_names()));

        let group = GroupBuilder::new()
            .attributes(root_attrs)
            .build(store.clone(), "/")
            .map_err(zarr_error)?;
        group.store_metadata().map_err(zarr_error)?;

        self.write_coordinate(&store, LAT, dataset.lat(), "degrees_north")?;
        self.write_coordinate(&store, LON, dataset.lon(), "degrees_east")?;

        if let Some(times) = dataset.time() {
            let seconds: Vec<i64> = times.iter().map(DateTime::timestamp).collect();
            let mut attrs = Map::new();
            attrs.insert("units".to_string(), json!(TIME_UNITS));
            attrs.insert("calendar".to_string(), json!("proleptic_gregorian"));
            let shape = vec![seconds.len() as u64];
            let array = self.create_array(
                &store,
                "/time",
                shape.clone(),
                shape,
                DataType::Int64,
                FillValue::from(i64::MIN),
                8,
                attrs,
            )?;
            store_elements(&array, &seconds)?;
        }

        for var in dataset.variables() {
            self.write_variable(&store, dataset, var)?;
        }

        Ok(())
    }

    fn write_coordinate(
        &self,
        store: &Arc<FilesystemStore>,
        name: &str,
        values: &[f64],
        units: &str,
    ) -> Result<()> {
        let mut attrs = Map::new();
        attrs.insert("units".to_string(), json!(units));
        let shape = vec![values.len() as u64];
        let array = self.create_array(
            store,
            &format!("/{}", name),
            shape.clone(),
            shape,
            DataType::Float64,
            FillValue::from(f64::NAN),
            8,
            attrs,
        )?;
        store_elements(&array, values)
    }

    fn write_variable(
        &self,
        store: &Arc<FilesystemStore>,
        dataset: &GriddedDataset,
        var: &Variable,
    ) -> Result<()> {
        let chunk = |n: usize| n.min(self.config.chunk_size).max(1) as u64;
        let (shape, chunks, dims) = if var.has_time() {
            (
                vec![dataset.ntime() as u64, dataset.nlat() as u64, dataset.nlon() as u64],
                vec![1, chunk(dataset.nlat()), chunk(dataset.nlon())],
                vec![TIME, LAT, LON],
            )
        } else {
            (
                vec![dataset.nlat() as u64, dataset.nlon() as u64],
                vec![chunk(dataset.nlat()), chunk(dataset.nlon())],
                vec![LAT, LON],
            )
        };

        let mut attrs = Map::new();
        for (key, value) in var.attrs() {
            attrs.insert(key.clone(), value.clone());
        }
        attrs.insert("kind".to_string(), json!(var.kind().as_str()));
        attrs.insert("dimensions".to_string(), json!(dims));

        let path = format!("/{}", var.name());
        match var.kind() {
            VariableKind::Continuous => {
                let array = self.create_array(
                    store,
                    &path,
                    shape,
                    chunks,
                    DataType::Float64,
                    FillValue::from(f64::NAN),
                    8,
                    attrs,
                )?;
                store_elements(&array, var.values())
            }
            VariableKind::Categorical(codebook) => {
                let labels: Map<String, Value> = codebook
                    .iter()
                    .map(|(code, label)| (code.to_string(), json!(label)))
                    .collect();
                attrs.insert("codebook".to_string(), Value::Object(labels));

                let codes = var
                    .values()
                    .iter()
                    .map(|&v| encode_code(v, var.name()))
                    .collect::<Result<Vec<i32>>>()?;
                let array = self.create_array(
                    store,
                    &path,
                    shape,
                    chunks,
                    DataType::Int32,
                    FillValue::from(CATEGORICAL_FILL),
                    4,
                    attrs,
                )?;
                store_elements(&array, &codes)
            }
        }
    }

    /// Build an array with the configured compression and store its metadata.
    #[allow(clippy::too_many_arguments)]
    fn create_array(
        &self,
        store: &Arc<FilesystemStore>,
        path: &str,
        shape: Vec<u64>,
        chunks: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        typesize: usize,
        attrs: Map<String, Value>,
    ) -> Result<Array<FilesystemStore>> {
        let chunks: Vec<u64> = chunks.into_iter().map(|c| c.max(1)).collect();
        let chunk_grid: zarrs::array::ChunkGrid = chunks
            .try_into()
            .map_err(|e| DatacubeError::value(format!("invalid chunk shape: {:?}", e)))?;

        let mut binding = ArrayBuilder::new(shape, data_type, chunk_grid, fill_value);
        let mut builder = binding.attributes(attrs);

        if self.config.compression != ZarrCompression::None {
            let codec = self.compression_codec(typesize)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder.build(store.clone(), path).map_err(zarr_error)?;
        array.store_metadata().map_err(zarr_error)?;
        Ok(array)
    }

    fn compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.config.compression_level)
            .map_err(|_| DatacubeError::value("invalid compression level"))?;

        let shuffle = if self.config.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = self.config.shuffle.then_some(typesize);

        let compressor = match self.config.compression {
            ZarrCompression::None => {
                return Err(DatacubeError::value("no compression configured"));
            }
            ZarrCompression::Lz4 | ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::Zstd | ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| DatacubeError::value(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

fn store_elements<T: zarrs::array::Element>(array: &Array<FilesystemStore>, data: &[T]) -> Result<()> {
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .store_array_subset_elements(&subset, data)
        .map_err(zarr_error)
}

fn encode_code(value: f64, variable: &str) -> Result<i32> {
    if value.is_nan() {
        return Ok(CATEGORICAL_FILL);
    }
    if value <= CATEGORICAL_FILL as f64 || value > i32::MAX as f64 {
        return Err(DatacubeError::value(format!(
            "class code {} of '{}' does not fit in int32",
            value, variable
        )));
    }
    Ok(value as i32)
}

/// Persist `dataset` with the default [`StoreConfig`].
pub fn save_dataset(dataset: &GriddedDataset, path: impl AsRef<Path>) -> Result<()> {
    DatasetWriter::default().write(dataset, path)
}

/// Load a dataset written by [`DatasetWriter`].
pub fn load_dataset(path: impl AsRef<Path>) -> Result<GriddedDataset> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Err(DatacubeError::io(
            path,
            io::Error::new(io::ErrorKind::NotFound, "no dataset store at this path"),
        ));
    }

    let store = Arc::new(FilesystemStore::new(path).map_err(zarr_error)?);
    let group = Group::open(store.clone(), "/").map_err(zarr_error)?;
    let root = group.attributes();

    match root.get("datacube_format").and_then(Value::as_u64) {
        Some(FORMAT_VERSION) => {}
        other => {
            return Err(DatacubeError::format(format!(
                "{} is not a datacube store (format {:?})",
                path.display(),
                other
            )))
        }
    }

    let name = root
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| DatacubeError::format("store has no dataset name"))?;
    let has_time = root
        .get("dims")
        .and_then(Value::as_array)
        .is_some_and(|dims| dims.iter().any(|d| d.as_str() == Some(TIME)));
    let variable_names: Vec<String> = root
        .get("variables")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let lat = read_f64(&store, "/lat")?;
    let lon = read_f64(&store, "/lon")?;
    let time = if has_time {
        let seconds = read_i64(&store, "/time")?;
        let times = seconds
            .into_iter()
            .map(|s| {
                DateTime::<Utc>::from_timestamp(s, 0)
                    .ok_or_else(|| DatacubeError::format(format!("timestamp {} out of range", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        Some(times)
    } else {
        None
    };

    let mut dataset = GriddedDataset::new(name, lat, lon, time)?;
    for (key, value) in root {
        if !RESERVED_ROOT_ATTRS.contains(&key.as_str()) {
            dataset.set_attr(key.clone(), value.clone());
        }
    }

    for var_name in &variable_names {
        let var = read_variable(&store, var_name)?;
        dataset.add_variable(var)?;
    }

    debug!(
        dataset = dataset.name(),
        path = %path.display(),
        variables = dataset.variables().len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

fn read_variable(store: &Arc<FilesystemStore>, name: &str) -> Result<Variable> {
    let array = Array::open(store.clone(), &format!("/{}", name)).map_err(zarr_error)?;
    let attrs = array.attributes();

    let has_time = attrs
        .get("dimensions")
        .and_then(Value::as_array)
        .map_or(array.shape().len() == 3, |dims| {
            dims.iter().any(|d| d.as_str() == Some(TIME))
        });

    let kind = match attrs.get("kind").and_then(Value::as_str) {
        Some("categorical") => {
            let mut codebook = Codebook::new();
            if let Some(labels) = attrs.get("codebook").and_then(Value::as_object) {
                for (code, label) in labels {
                    let code: i64 = code
                        .parse()
                        .map_err(|_| DatacubeError::format(format!("invalid class code '{}'", code)))?;
                    codebook.insert(code, label.as_str().unwrap_or_default().to_string());
                }
            }
            VariableKind::Categorical(codebook)
        }
        Some("continuous") | None => VariableKind::Continuous,
        Some(other) => {
            return Err(DatacubeError::format(format!(
                "variable '{}' has unknown kind '{}'",
                name, other
            )))
        }
    };

    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    let values: Vec<f64> = if kind.is_categorical() {
        array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map_err(zarr_error)?
            .into_iter()
            .map(|c| if c == CATEGORICAL_FILL { f64::NAN } else { c as f64 })
            .collect()
    } else {
        array
            .retrieve_array_subset_elements::<f64>(&subset)
            .map_err(zarr_error)?
    };

    let var_attrs = attrs
        .iter()
        .filter(|(key, _)| !RESERVED_VARIABLE_ATTRS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Variable::new(name, kind, has_time, values).with_attrs(var_attrs))
}

fn read_f64(store: &Arc<FilesystemStore>, path: &str) -> Result<Vec<f64>> {
    let array = Array::open(store.clone(), path).map_err(zarr_error)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<f64>(&subset)
        .map_err(zarr_error)
}

fn read_i64(store: &Arc<FilesystemStore>, path: &str) -> Result<Vec<i64>> {
    let array = Array::open(store.clone(), path).map_err(zarr_error)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());
    array
        .retrieve_array_subset_elements::<i64>(&subset)
        .map_err(zarr_error)
}
