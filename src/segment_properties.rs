// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Static column layout shared by all blocks of a segment.

use std::sync::Arc;

use crate::proto::{ColumnKind, ColumnSchema, DataType, Encoding};
use crate::{StorageError, StorageResult};

/// Byte width of the values of a dimension column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueWidth {
    Fixed(usize),
    /// Each value is prefixed with its `u16` length.
    Variable,
}

impl ValueWidth {
    pub fn from_persisted(width: u32) -> Self {
        match width {
            0 => ValueWidth::Variable,
            w => ValueWidth::Fixed(w as usize),
        }
    }

    pub fn to_persisted(self) -> u32 {
        match self {
            ValueWidth::Variable => 0,
            ValueWidth::Fixed(w) => w as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDescriptor {
    pub name: String,
    pub width: ValueWidth,
    pub encodings: Vec<Encoding>,
    pub cardinality: u32,
}

impl DimensionDescriptor {
    pub fn has_encoding(&self, encoding: Encoding) -> bool {
        self.encodings.contains(&encoding)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureDescriptor {
    pub name: String,
    pub data_type: DataType,
}

/// Column layout of a segment: ordered dimension columns followed by ordered measure columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentProperties {
    dimensions: Vec<DimensionDescriptor>,
    measures: Vec<MeasureDescriptor>,
    dimension_widths: Arc<[ValueWidth]>,
}

pub type SegmentPropertiesRef = Arc<SegmentProperties>;

impl SegmentProperties {
    pub fn new(dimensions: Vec<DimensionDescriptor>, measures: Vec<MeasureDescriptor>) -> Self {
        let dimension_widths = dimensions.iter().map(|d| d.width).collect();
        Self {
            dimensions,
            measures,
            dimension_widths,
        }
    }

    /// Build the properties from the column schema persisted in a footer.
    pub fn from_columns(columns: &[ColumnSchema]) -> StorageResult<Self> {
        let mut dimensions = vec![];
        let mut measures = vec![];
        for column in columns {
            match ColumnKind::try_from(column.kind)
                .map_err(|_| StorageError::decode(format!("invalid column kind {}", column.kind)))?
            {
                ColumnKind::Dimension => {
                    let encodings = column
                        .encodings
                        .iter()
                        .map(|e| {
                            Encoding::try_from(*e).map_err(|_| {
                                StorageError::decode(format!("invalid encoding {e} of {}", column.name))
                            })
                        })
                        .collect::<StorageResult<Vec<_>>>()?;
                    dimensions.push(DimensionDescriptor {
                        name: column.name.clone(),
                        width: ValueWidth::from_persisted(column.value_width),
                        encodings,
                        cardinality: column.cardinality,
                    });
                }
                ColumnKind::Measure => {
                    let data_type = DataType::try_from(column.data_type).map_err(|_| {
                        StorageError::decode(format!("invalid data type of {}", column.name))
                    })?;
                    if data_type == DataType::Bytes {
                        return Err(StorageError::decode(format!(
                            "measure {} must be numeric",
                            column.name
                        )));
                    }
                    measures.push(MeasureDescriptor {
                        name: column.name.clone(),
                        data_type,
                    });
                }
            }
        }
        Ok(Self::new(dimensions, measures))
    }

    /// Column schema in footer order, the inverse of [`SegmentProperties::from_columns`].
    pub fn to_columns(&self) -> Vec<ColumnSchema> {
        let dimensions = self.dimensions.iter().map(|d| ColumnSchema {
            name: d.name.clone(),
            kind: ColumnKind::Dimension.into(),
            data_type: DataType::Bytes.into(),
            value_width: d.width.to_persisted(),
            encodings: d.encodings.iter().map(|e| (*e).into()).collect(),
            cardinality: d.cardinality,
        });
        let measures = self.measures.iter().map(|m| ColumnSchema {
            name: m.name.clone(),
            kind: ColumnKind::Measure.into(),
            data_type: m.data_type.into(),
            ..Default::default()
        });
        dimensions.chain(measures).collect()
    }

    pub fn dimensions(&self) -> &[DimensionDescriptor] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[MeasureDescriptor] {
        &self.measures
    }

    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    pub fn num_measures(&self) -> usize {
        self.measures.len()
    }

    /// Width of every dimension column, as needed by dimension chunk readers.
    pub fn dimension_widths(&self) -> Arc<[ValueWidth]> {
        self.dimension_widths.clone()
    }

    /// Describe the first difference with `other`, or `None` if both describe the same layout.
    pub fn diff(&self, other: &SegmentProperties) -> Option<String> {
        if self.dimensions.len() != other.dimensions.len() {
            return Some(format!(
                "expected {} dimensions, found {}",
                self.dimensions.len(),
                other.dimensions.len()
            ));
        }
        if self.measures.len() != other.measures.len() {
            return Some(format!(
                "expected {} measures, found {}",
                self.measures.len(),
                other.measures.len()
            ));
        }
        if let Some((a, b)) = self
            .dimensions
            .iter()
            .zip(&other.dimensions)
            .find(|(a, b)| a != b)
        {
            return Some(format!("dimension {:?} differs from {:?}", a, b));
        }
        if let Some((a, b)) = self.measures.iter().zip(&other.measures).find(|(a, b)| a != b) {
            return Some(format!("measure {:?} differs from {:?}", a, b));
        }
        None
    }
}
