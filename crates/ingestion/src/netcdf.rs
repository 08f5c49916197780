//! NetCDF archive reading (MACA / CMIP downloads).
//!
//! Requires the `netcdf` feature and the system libnetcdf/libhdf5.

use std::path::Path;

use netcdf::AttributeValue;
use tracing::{debug, info};

use cube_common::time::decode_cf_time;
use cube_common::{DatacubeError, GriddedDataset, Result, Variable};

const LAT_NAMES: [&str; 3] = ["lat", "latitude", "y"];
const LON_NAMES: [&str; 3] = ["lon", "longitude", "x"];
const TIME_NAMES: [&str; 2] = ["time", "t"];

fn nc_error(path: &Path, err: impl std::fmt::Display) -> DatacubeError {
    DatacubeError::format(format!("{}: {}", path.display(), err))
}

/// Read every `(time, lat, lon)` or `(lat, lon)` variable of a NetCDF file.
///
/// Packed values are unpacked with `scale_factor`/`add_offset`; `_FillValue`
/// and `missing_value` become missing.
pub fn read_netcdf(path: &Path) -> Result<GriddedDataset> {
    if !path.is_file() {
        return Err(DatacubeError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "data file not found"),
        ));
    }
    let file = netcdf::open(path).map_err(|e| nc_error(path, e))?;

    let dim_names: Vec<String> = file.dimensions().map(|d| d.name()).collect();
    let find_dim = |candidates: &[&str]| {
        dim_names
            .iter()
            .find(|name| candidates.contains(&name.to_lowercase().as_str()))
            .cloned()
    };
    let lat_dim = find_dim(&LAT_NAMES).ok_or_else(|| nc_error(path, "no latitude dimension"))?;
    let lon_dim = find_dim(&LON_NAMES).ok_or_else(|| nc_error(path, "no longitude dimension"))?;
    let time_dim = find_dim(&TIME_NAMES);

    let lat = read_coordinate(&file, &lat_dim, path)?;
    let lon = read_coordinate(&file, &lon_dim, path)?;
    let time = match &time_dim {
        Some(name) => {
            let var = file
                .variable(name)
                .ok_or_else(|| nc_error(path, format!("no '{}' variable", name)))?;
            let units = get_string_attr(&var, "units")
                .ok_or_else(|| nc_error(path, "time variable has no units"))?;
            let values: Vec<f64> = var.get_values(..).map_err(|e| nc_error(path, e))?;
            Some(decode_cf_time(&units, &values)?)
        }
        None => None,
    };

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("netcdf")
        .to_string();
    let mut dataset = GriddedDataset::new(&name, lat, lon, time)?;
    if let Some(file_name) = path.file_name().and_then(|s| s.to_str()) {
        dataset.set_attr("source", file_name);
    }

    for var in file.variables() {
        let var_name = var.name();
        if [&lat_dim, &lon_dim].contains(&&var_name) || time_dim.as_ref() == Some(&var_name) {
            continue;
        }

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let has_time = match dims.as_slice() {
            [t, y, x] if Some(t) == time_dim.as_ref() && *y == lat_dim && *x == lon_dim => true,
            [y, x] if *y == lat_dim && *x == lon_dim => false,
            _ => {
                debug!(variable = %var_name, dims = ?dims, "Skipping non-gridded variable");
                continue;
            }
        };

        let raw: Vec<f64> = var.get_values(..).map_err(|e| nc_error(path, e))?;
        let scale = get_f64_attr(&var, "scale_factor").unwrap_or(1.0);
        let offset = get_f64_attr(&var, "add_offset").unwrap_or(0.0);
        let fills: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|attr| get_f64_attr(&var, attr))
            .collect();

        let values = raw
            .into_iter()
            .map(|v| {
                if v.is_nan() || fills.contains(&v) {
                    f64::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();

        let mut variable = Variable::new(
            var_name.clone(),
            cube_common::VariableKind::Continuous,
            has_time,
            values,
        );
        for attr in ["units", "long_name", "standard_name"] {
            if let Some(value) = get_string_attr(&var, attr) {
                variable = variable.with_attr(attr, value);
            }
        }
        dataset.add_variable(variable)?;
    }

    info!(
        path = %path.display(),
        nlat = dataset.nlat(),
        nlon = dataset.nlon(),
        ntime = dataset.ntime(),
        variables = ?dataset.variable_names(),
        "Read NetCDF archive"
    );
    Ok(dataset)
}

fn read_coordinate(file: &netcdf::File, name: &str, path: &Path) -> Result<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| nc_error(path, format!("no '{}' coordinate variable", name)))?;
    var.get_values(..).map_err(|e| nc_error(path, e))
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
