//! GeoTIFF reading and writing for single-band classification rasters.
//!
//! Only the GeoTIFF tags needed to place a north-up raster are used:
//!
//! | Tag   | Name               | Use                              |
//! |-------|--------------------|----------------------------------|
//! | 33550 | ModelPixelScale    | pixel size                       |
//! | 33922 | ModelTiepoint      | raster origin                    |
//! | 34735 | GeoKeyDirectory    | EPSG code (keys 3072 / 2048)     |
//! | 42113 | GDAL_NODATA        | nodata value (ASCII)             |
//!
//! Codebooks live next to the raster in `<raster>.codebook.json` as
//! `{"<code>": "<label>"}`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use cube_common::{Codebook, DatacubeError, Result};
use projection::ProjectedCrs;

use crate::categorical::{CategoricalRaster, GeoTransform};

pub const MODEL_PIXEL_SCALE: u16 = 33550;
pub const MODEL_TIEPOINT: u16 = 33922;
pub const GEO_KEY_DIRECTORY: u16 = 34735;
pub const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;
const USER_DEFINED: u32 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn tiff_error(path: &Path, err: impl std::fmt::Display) -> DatacubeError {
    DatacubeError::format(format!("{}: {}", path.display(), err))
}

/// Read a single-band GeoTIFF into a [`CategoricalRaster`] without codebook.
pub fn read_geotiff(path: &Path) -> Result<CategoricalRaster> {
    let file = File::open(path).map_err(|e| DatacubeError::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| tiff_error(path, e))?;

    match decoder.colortype().map_err(|e| tiff_error(path, e))? {
        ColorType::Gray(_) => {}
        other => {
            return Err(DatacubeError::format(format!(
                "{}: expected a single-band raster, found {:?}",
                path.display(),
                other
            )))
        }
    }

    let (width, height) = decoder.dimensions().map_err(|e| tiff_error(path, e))?;

    let scale = decoder
        .find_tag(tag(MODEL_PIXEL_SCALE))
        .map_err(|e| tiff_error(path, e))?
        .ok_or_else(|| tiff_error(path, "missing ModelPixelScale tag"))?
        .into_f64_vec()
        .map_err(|e| tiff_error(path, e))?;
    let tiepoint = decoder
        .find_tag(tag(MODEL_TIEPOINT))
        .map_err(|e| tiff_error(path, e))?
        .ok_or_else(|| tiff_error(path, "missing ModelTiepoint tag"))?
        .into_f64_vec()
        .map_err(|e| tiff_error(path, e))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(tiff_error(path, "malformed georeferencing tags"));
    }

    // Tiepoint (I, J, K, X, Y, Z) ties raster point (I, J) to model point (X, Y).
    let transform = GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        scale[1],
    )?;

    let geokeys = decoder
        .find_tag(tag(GEO_KEY_DIRECTORY))
        .map_err(|e| tiff_error(path, e))?
        .ok_or_else(|| tiff_error(path, "missing GeoKeyDirectory tag"))?
        .into_u32_vec()
        .map_err(|e| tiff_error(path, e))?;
    let epsg = epsg_from_geokeys(&geokeys)
        .ok_or_else(|| DatacubeError::value(format!("{}: no EPSG code in GeoKeys", path.display())))?;
    let crs = ProjectedCrs::from_epsg(epsg)
        .map_err(|e| DatacubeError::value(format!("{}: {}", path.display(), e)))?;

    let nodata = match decoder
        .find_tag(tag(GDAL_NODATA))
        .map_err(|e| tiff_error(path, e))?
    {
        Some(value) => {
            let text = value.into_string().map_err(|e| tiff_error(path, e))?;
            let text = text.trim_matches(char::from(0)).trim();
            Some(text.parse::<f64>().map_err(|_| {
                tiff_error(path, format!("invalid GDAL_NODATA value '{}'", text))
            })?)
        }
        None => None,
    };

    let codes = decoding_to_f64(decoder.read_image().map_err(|e| tiff_error(path, e))?)
        .ok_or_else(|| tiff_error(path, "unsupported sample format"))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("raster")
        .to_string();

    debug!(
        path = %path.display(),
        width = width,
        height = height,
        epsg = epsg,
        nodata = ?nodata,
        "Read GeoTIFF"
    );

    let raster = CategoricalRaster::new(
        name,
        width as usize,
        height as usize,
        codes,
        transform,
        crs,
    )?;
    Ok(match nodata {
        Some(nodata) => raster.with_nodata(nodata),
        None => raster,
    })
}

/// Write `raster` as a 16-bit GeoTIFF tagged with `epsg`.
///
/// Missing pixels are written as `nodata`, which is recorded in GDAL_NODATA.
pub fn write_geotiff(path: &Path, raster: &CategoricalRaster, epsg: u32, nodata: u16) -> Result<()> {
    let codes = raster
        .codes()
        .iter()
        .map(|&c| {
            if c.is_nan() {
                Ok(nodata)
            } else if (0.0..=u16::MAX as f64).contains(&c) {
                Ok(c as u16)
            } else {
                Err(DatacubeError::value(format!(
                    "class code {} does not fit a 16-bit raster",
                    c
                )))
            }
        })
        .collect::<Result<Vec<u16>>>()?;

    let key = if epsg == 4326 || epsg == 4269 || epsg == 4258 {
        GEOGRAPHIC_TYPE_KEY
    } else {
        PROJECTED_CS_TYPE_KEY
    };
    let epsg = u16::try_from(epsg)
        .map_err(|_| DatacubeError::value(format!("EPSG code {} does not fit a GeoKey", epsg)))?;
    // Header (version 1.1.0, one key) followed by the key entry.
    let geokeys: [u16; 8] = [1, 1, 0, 1, key as u16, 0, 1, epsg];

    let t = raster.transform();
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let nodata_text = nodata.to_string();

    let file = File::create(path).map_err(|e| DatacubeError::io(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(|e| tiff_error(path, e))?;
    let mut image = encoder
        .new_image::<colortype::Gray16>(raster.width() as u32, raster.height() as u32)
        .map_err(|e| tiff_error(path, e))?;

    let dir = image.encoder();
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(|e| tiff_error(path, e))?;
    dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| tiff_error(path, e))?;
    dir.write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(|e| tiff_error(path, e))?;
    dir.write_tag(tag(GDAL_NODATA), nodata_text.as_str())
        .map_err(|e| tiff_error(path, e))?;

    image.write_data(&codes).map_err(|e| tiff_error(path, e))?;
    Ok(())
}

/// Sidecar codebook path for a raster: `<raster>.codebook.json`.
pub fn codebook_path(raster: &Path) -> PathBuf {
    let mut name = raster.as_os_str().to_owned();
    name.push(".codebook.json");
    PathBuf::from(name)
}

/// Read a `{"<code>": "<label>"}` codebook.
pub fn read_codebook(path: &Path) -> Result<Codebook> {
    let text = fs::read_to_string(path).map_err(|e| DatacubeError::io(path, e))?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&text)?;
    raw.into_iter()
        .map(|(code, label)| {
            code.trim()
                .parse::<i64>()
                .map(|code| (code, label))
                .map_err(|_| {
                    DatacubeError::format(format!(
                        "{}: invalid class code '{}'",
                        path.display(),
                        code
                    ))
                })
        })
        .collect()
}

pub fn write_codebook(path: &Path, codebook: &Codebook) -> Result<()> {
    let raw: BTreeMap<String, &String> = codebook
        .iter()
        .map(|(code, label)| (code.to_string(), label))
        .collect();
    let text = serde_json::to_string_pretty(&raw)?;
    fs::write(path, text).map_err(|e| DatacubeError::io(path, e))
}

/// EPSG code from a GeoKeyDirectory, preferring the projected CRS key.
fn epsg_from_geokeys(keys: &[u32]) -> Option<u32> {
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u32]> = keys.get(4..4 + count * 4)?.chunks_exact(4).collect();

    // Values stored inline have TIFFTagLocation 0.
    let lookup = |id: u32| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3])
            .filter(|&code| code != 0 && code != USER_DEFINED)
    };
    lookup(PROJECTED_CS_TYPE_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
}

#[allow(unreachable_patterns)]
fn decoding_to_f64(result: DecodingResult) -> Option<Vec<f64>> {
    Some(match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection::AlbersEqualArea;
    use test_utils::{scratch_dir, vegetation_codebook};

    #[test]
    fn test_epsg_from_geokeys() {
        let projected = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 5070];
        assert_eq!(epsg_from_geokeys(&projected), Some(5070));

        let geographic = [1, 1, 0, 1, 2048, 0, 1, 4326];
        assert_eq!(epsg_from_geokeys(&geographic), Some(4326));

        let user_defined = [1, 1, 0, 1, 3072, 0, 1, 32767];
        assert_eq!(epsg_from_geokeys(&user_defined), None);
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 4]), None);
    }

    #[test]
    fn test_codebook_sidecar_round_trip() {
        let dir = scratch_dir();
        let raster = dir.path().join("LF2022_EVT.tif");
        let sidecar = codebook_path(&raster);
        assert_eq!(sidecar.file_name().unwrap(), "LF2022_EVT.tif.codebook.json");

        write_codebook(&sidecar, &vegetation_codebook()).unwrap();
        assert_eq!(read_codebook(&sidecar).unwrap(), vegetation_codebook());

        fs::write(&sidecar, r#"{"pine": "Ponderosa"}"#).unwrap();
        assert_eq!(read_codebook(&sidecar).unwrap_err().code(), "IOError");
    }

    #[test]
    fn test_geotiff_round_trip_albers() {
        let dir = scratch_dir();
        let path = dir.path().join("evt.tif");

        let albers = AlbersEqualArea::conus();
        let (x0, y0) = albers.forward(44.6, -104.7);
        let codes = vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 1.0];
        let raster = CategoricalRaster::new(
            "evt",
            3,
            2,
            codes,
            GeoTransform::new(x0, y0, 30.0, 30.0).unwrap(),
            ProjectedCrs::Albers(albers),
        )
        .unwrap();

        write_geotiff(&path, &raster, 5070, 0).unwrap();
        let read = read_geotiff(&path).unwrap();

        assert_eq!(read.name(), "evt");
        assert_eq!((read.width(), read.height()), (3, 2));
        assert_eq!(read.crs().name(), "albers_conical_equal_area");
        assert!((read.transform().origin_x - x0).abs() < 1e-6);
        assert!((read.transform().origin_y - y0).abs() < 1e-6);
        assert_eq!(read.codes()[0], 1.0);
        assert!(read.codes()[2].is_nan());
        assert_eq!(read.codes()[5], 1.0);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_geotiff(Path::new("/nonexistent/evt.tif")).unwrap_err();
        assert!(matches!(err, DatacubeError::Io { .. }));
    }
}
