//! NetCDF data loading functionality.
//!
//! This module reads a NetCDF file (a downloaded member, an OPeNDAP endpoint
//! or a cache entry) into a [`ForecastDataset`]. Every numeric variable is
//! read through the library's type conversion as `f64`; coordinate variables
//! keep full precision, data arrays are stored as `f32`.
//!
//! Values are decoded following CF conventions on the way in: `_FillValue`
//! and `missing_value` cells become NaN and packed variables are unpacked
//! with `scale_factor` and `add_offset`.

use ndarray::{Array, IxDyn};
use netcdf::{Attribute, Variable as NetCDFVariable};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::dataset::{
    decode_members, AttributeValue, Dimension, ForecastDataset, Metadata, Variable, DAY_VAR,
    INIT_HOUR_VAR, MEMBER_VAR, PACKING_ATTRIBUTES,
};
use crate::error::{Cfsv2Error, Result};

/// Type alias for the NetCDF loading result to simplify the complex return type
pub type LoadResult = Result<(Metadata, HashMap<String, Array<f32, IxDyn>>)>;

/// Load a local NetCDF file into memory.
pub fn load_netcdf(path: &Path) -> Result<ForecastDataset> {
    if !path.exists() {
        return Err(Cfsv2Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File not found: {}", path.display()),
        )));
    }

    let file = netcdf::open(path)?;
    info!("Opened NetCDF file: {}", path.display());
    from_file(&file)
}

/// Open a remote OPeNDAP endpoint.
///
/// Requires a netCDF library built with DAP support.
pub fn open_remote(url: &str) -> Result<ForecastDataset> {
    let file = netcdf::open(url)?;
    debug!(url = url, "Opened remote dataset");
    from_file(&file)
}

fn from_file(file: &netcdf::File) -> Result<ForecastDataset> {
    debug!("File has {} variables", file.variables().count());
    debug!("File has {} dimensions", file.dimensions().count());

    let (mut metadata, mut data) = read_file(file)?;

    let step_members = match (
        data.remove(INIT_HOUR_VAR),
        data.remove(MEMBER_VAR),
        data.remove(DAY_VAR),
    ) {
        (Some(hours), Some(members), Some(days)) => {
            let flat = |a: Array<f32, IxDyn>| a.iter().copied().collect::<Vec<f32>>();
            decode_members(&flat(hours), &flat(members), &flat(days))
        }
        _ => Vec::new(),
    };
    for name in [INIT_HOUR_VAR, MEMBER_VAR, DAY_VAR] {
        metadata.variables.remove(name);
    }

    ForecastDataset::new(metadata, data, step_members)
}

/// Read metadata and data arrays from an open file.
fn read_file(file: &netcdf::File) -> LoadResult {
    let mut global_attributes = HashMap::new();
    for attr in file.attributes() {
        global_attributes.insert(attr.name().to_string(), convert_attribute(&attr)?);
    }

    let mut dimensions = HashMap::new();
    for dim in file.dimensions() {
        let dimension = Dimension {
            name: dim.name().to_string(),
            size: dim.len(),
            is_unlimited: dim.is_unlimited(),
        };
        dimensions.insert(dimension.name.clone(), dimension);
    }

    let mut variables = HashMap::new();
    let mut coordinates = HashMap::new();
    let mut data = HashMap::new();

    for var in file.variables() {
        let name = var.name().to_string();
        let var_dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|dim| dim.name().to_string())
            .collect();
        let var_shape: Vec<usize> = var.dimensions().iter().map(|dim| dim.len()).collect();

        let mut values = match read_values(&var, &var_shape) {
            Ok(values) => values,
            Err(e) => {
                // Text and compound variables carry nothing we can grid.
                warn!("Skipping unsupported variable {}: {}", name, e);
                continue;
            }
        };

        let mut var_attrs = HashMap::new();
        for attr in var.attributes() {
            var_attrs.insert(attr.name().to_string(), convert_attribute(&attr)?);
        }
        if ![INIT_HOUR_VAR, MEMBER_VAR, DAY_VAR].contains(&name.as_str()) {
            decode_cf(&name, &mut values, &mut var_attrs);
        }

        if var_dims.len() == 1 && var_dims[0] == name {
            coordinates.insert(name.clone(), values.clone());
        }

        let array = Array::from_shape_vec(
            IxDyn(&var_shape),
            values.into_iter().map(|v| v as f32).collect(),
        )?;
        data.insert(name.clone(), array);

        variables.insert(
            name.clone(),
            Variable {
                name,
                dimensions: var_dims,
                shape: var_shape,
                attributes: var_attrs,
            },
        );
    }

    for (dim_name, dim) in &dimensions {
        if !coordinates.contains_key(dim_name) {
            let coord_values: Vec<f64> = (0..dim.size).map(|i| i as f64).collect();
            coordinates.insert(dim_name.clone(), coord_values);
            debug!("Created default coordinates for dimension: {}", dim_name);
        }
    }

    Ok((
        Metadata {
            global_attributes,
            dimensions,
            variables,
            coordinates,
        },
        data,
    ))
}

/// Mask fill values to NaN and unpack `scale_factor`/`add_offset`.
///
/// Packing attributes are consumed, so the stored values are physical.
/// A packed variable also loses its fill attributes: they are expressed in
/// the packed domain and NaN now marks missing cells.
fn decode_cf(name: &str, values: &mut [f64], attributes: &mut HashMap<String, AttributeValue>) {
    let numbers = |attr: &str| -> Vec<f64> {
        match attributes.get(attr) {
            Some(AttributeValue::Number(v)) => vec![*v],
            Some(AttributeValue::NumberArray(v)) => v.clone(),
            _ => Vec::new(),
        }
    };
    let fills: Vec<f64> = numbers("_FillValue")
        .into_iter()
        .chain(numbers("missing_value"))
        .collect();
    let scale = numbers("scale_factor").first().copied();
    let offset = numbers("add_offset").first().copied();
    let packed = scale.is_some() || offset.is_some();

    let (scale, offset) = (scale.unwrap_or(1.0), offset.unwrap_or(0.0));
    let mut masked = 0usize;
    for v in values.iter_mut() {
        if fills.contains(v) {
            *v = f64::NAN;
            masked += 1;
        } else if packed {
            *v = *v * scale + offset;
        }
    }

    if packed {
        for attr in PACKING_ATTRIBUTES.iter().chain(&["_FillValue", "missing_value"]) {
            attributes.remove(*attr);
        }
    }
    if masked > 0 || packed {
        debug!(variable = name, masked, packed, "Decoded CF values");
    }
}

fn read_values(var: &NetCDFVariable, shape: &[usize]) -> Result<Vec<f64>> {
    if shape.iter().product::<usize>() == 0 {
        return Ok(Vec::new());
    }
    Ok(var.get_values::<f64, _>(..)?)
}

/// Convert a NetCDF attribute to our AttributeValue enum
fn convert_attribute(attr: &Attribute) -> Result<AttributeValue> {
    use netcdf::AttributeValue as NcAttributeValue;

    let value = attr.value()?;

    let converted = match value {
        NcAttributeValue::Str(s) => AttributeValue::Text(s),
        NcAttributeValue::Uchar(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Schar(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Short(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Ushort(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Int(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Uint(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Float(v) => AttributeValue::Number(v as f64),
        NcAttributeValue::Double(v) => AttributeValue::Number(v),
        NcAttributeValue::Shorts(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Ints(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Floats(v) => {
            AttributeValue::NumberArray(v.into_iter().map(f64::from).collect())
        }
        NcAttributeValue::Doubles(v) => AttributeValue::NumberArray(v),
        other => AttributeValue::Text(format!("{:?}", other)),
    };
    Ok(converted)
}
