//! 分隔文本资源解析
//!
//! 按表头名称（而不是位置）映射列，逐行产出兴趣点。单行错误只跳过该行，
//! 缺少必需列则整个资源作废。

use crate::error::{AggregatorError, Result};
use crate::geo::LatLng;
use crate::types::{Point, UNKNOWN_CATEGORY};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

const NAME_COLUMNS: &[&str] = &["name"];
const CATEGORY_COLUMNS: &[&str] = &["type", "category"];
const LATITUDE_COLUMNS: &[&str] = &["latitude", "lat"];
const LONGITUDE_COLUMNS: &[&str] = &["longitude", "long", "lon", "lng"];
const LINK_COLUMNS: &[&str] = &["nhle link", "link", "url"];

/// 源数据里已知的类别写法问题
static DEFAULT_ALIASES: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("Listed Buillding", "Listed Building"),
        ("Parks and Gardens", "Parks & Gardens"),
    ]
});

/// 类别别名表，键不区分大小写
#[derive(Debug, Clone, Default)]
pub struct CategoryAliases {
    aliases: HashMap<String, String>,
}

impl CategoryAliases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut aliases = Self::new();
        for (raw, canonical) in DEFAULT_ALIASES.iter() {
            aliases.insert(raw, canonical);
        }
        aliases
    }

    pub fn insert(&mut self, raw: &str, canonical: &str) {
        self.aliases
            .insert(raw.trim().to_lowercase(), canonical.trim().to_string());
    }

    /// 去除首尾空白后查别名表，空值归为 `Unknown`
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return UNKNOWN_CATEGORY.to_string();
        }
        self.aliases
            .get(&trimmed.to_lowercase())
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }
}

/// 单行解析错误（非致命）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    /// 数据行序号，从 1 开始，不含表头
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedResource {
    pub points: Vec<Point>,
    pub row_errors: Vec<RowError>,
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    name: usize,
    category: usize,
    latitude: usize,
    longitude: usize,
    link: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();
        let find = |candidates: &[&str]| {
            normalized
                .iter()
                .position(|h| candidates.contains(&h.as_str()))
        };

        let name = find(NAME_COLUMNS);
        let category = find(CATEGORY_COLUMNS);
        let latitude = find(LATITUDE_COLUMNS);
        let longitude = find(LONGITUDE_COLUMNS);

        let mut missing = Vec::new();
        for (found, label) in [
            (name, "name"),
            (category, "type"),
            (latitude, "latitude"),
            (longitude, "longitude"),
        ] {
            if found.is_none() {
                missing.push(label.to_string());
            }
        }

        match (name, category, latitude, longitude) {
            (Some(name), Some(category), Some(latitude), Some(longitude)) => Ok(Self {
                name,
                category,
                latitude,
                longitude,
                link: find(LINK_COLUMNS),
            }),
            _ => Err(AggregatorError::Schema { missing }),
        }
    }
}

pub struct RecordParser {
    aliases: CategoryAliases,
}

impl RecordParser {
    pub fn new(aliases: CategoryAliases) -> Self {
        Self { aliases }
    }

    /// 读取表头并返回逐行迭代器；表头缺少必需列时返回 `Schema` 错误，
    /// 表头本身无法读取时返回 `Header` 错误
    pub fn records<R: Read>(&self, reader: R) -> Result<Records<'_, R>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| AggregatorError::Header(e.to_string()))?;
        let columns = ColumnMap::from_headers(headers)?;

        Ok(Records {
            inner: rdr.into_records(),
            columns,
            aliases: &self.aliases,
            row: 0,
        })
    }

    pub fn parse<R: Read>(&self, reader: R) -> Result<ParsedResource> {
        let mut parsed = ParsedResource::default();
        for record in self.records(reader)? {
            match record {
                Ok(point) => parsed.points.push(point),
                Err(e) => parsed.row_errors.push(e),
            }
        }
        Ok(parsed)
    }
}

pub struct Records<'a, R: Read> {
    inner: csv::StringRecordsIntoIter<R>,
    columns: ColumnMap,
    aliases: &'a CategoryAliases,
    row: usize,
}

impl<R: Read> Records<'_, R> {
    fn to_point(&self, record: &csv::StringRecord) -> std::result::Result<Point, RowError> {
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let row = self.row;

        let coordinate = |idx: usize, label: &str| -> std::result::Result<f64, RowError> {
            let raw = field(idx);
            if raw.is_empty() {
                return Err(RowError {
                    row,
                    reason: format!("缺少{}", label),
                });
            }
            raw.parse::<f64>().map_err(|_| RowError {
                row,
                reason: format!("{}不是数字: '{}'", label, raw),
            })
        };

        let lat = coordinate(self.columns.latitude, "纬度")?;
        let lng = coordinate(self.columns.longitude, "经度")?;
        let location = LatLng::new(lat, lng);
        if !location.is_valid() {
            return Err(RowError {
                row,
                reason: format!("坐标超出范围: ({}, {})", lat, lng),
            });
        }

        let mut point = Point::new(
            field(self.columns.name),
            self.aliases.normalize(field(self.columns.category)),
            location,
        );
        if let Some(idx) = self.columns.link {
            point = point.with_link(field(idx));
        }
        Ok(point)
    }
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = std::result::Result<Point, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = self.inner.next()?;
            self.row += 1;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    return Some(Err(RowError {
                        row: self.row,
                        reason: format!("无法读取该行: {}", e),
                    }))
                }
            };
            // 全空行直接跳过
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            return Some(self.to_point(&record));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RecordParser {
        RecordParser::new(CategoryAliases::with_defaults())
    }

    #[test]
    fn test_parse_heritage_columns() {
        let csv = "Name,Type,Latitude,Longitude,NHLE link\n\
                   Stonehenge,World Heritage Site,51.1789,-1.8262,https://example.org/1\n\
                   Hyde Park,Parks & Gardens,51.5073,-0.1657,\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        assert!(parsed.row_errors.is_empty());
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.points[0].name, "Stonehenge");
        assert_eq!(parsed.points[0].link.as_deref(), Some("https://example.org/1"));
        assert_eq!(parsed.points[1].link, None);
        assert_eq!(parsed.points[1].location, LatLng::new(51.5073, -0.1657));
    }

    #[test]
    fn test_columns_matched_by_name_not_position() {
        let csv = "longitude,lat,category,NAME\n-0.1,51.5,Monument,Cenotaph\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        assert_eq!(parsed.points.len(), 1);
        let p = &parsed.points[0];
        assert_eq!(p.name, "Cenotaph");
        assert_eq!(p.category, "Monument");
        assert_eq!(p.location, LatLng::new(51.5, -0.1));
    }

    #[test]
    fn test_missing_required_columns_is_schema_error() {
        let csv = "Name,Latitude\nA,51.0\n";
        match parser().parse(csv.as_bytes()) {
            Err(AggregatorError::Schema { missing }) => {
                assert_eq!(missing, vec!["type", "longitude"]);
            }
            other => panic!("unexpected: {:?}", other.map(|p| p.points.len())),
        }
    }

    #[test]
    fn test_unreadable_header_is_not_schema_error() {
        let csv: &[u8] = b"Na\xffme,Type,Latitude,Longitude\nA,Monument,51.0,0.0\n";
        assert!(matches!(parser().parse(csv), Err(AggregatorError::Header(_))));
    }

    #[test]
    fn test_bad_row_is_skipped_not_fatal() {
        let csv = "Name,Type,Latitude,Longitude\n\
                   Good,Monument,51.0,-1.0\n\
                   Bad,Monument,abc,-1.0\n\
                   Missing,Monument,,-1.0\n\
                   AlsoGood,Monument,52.0,-1.5\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        let names: Vec<_> = parsed.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Good", "AlsoGood"]);
        assert_eq!(parsed.row_errors.len(), 2);
        assert_eq!(parsed.row_errors[0].row, 2);
        assert!(parsed.row_errors[0].reason.contains("abc"));
        assert_eq!(parsed.row_errors[1].row, 3);
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let csv = "Name,Type,Latitude,Longitude\nX,Monument,123.0,0.0\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        assert!(parsed.points.is_empty());
        assert_eq!(parsed.row_errors.len(), 1);
    }

    #[test]
    fn test_category_normalized_through_aliases() {
        let csv = "Name,Type,Latitude,Longitude\n\
                   A, Listed Buillding ,51.0,0.0\n\
                   B,,51.0,0.0\n\
                   C,  Battlefield,51.0,0.0\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        let cats: Vec<_> = parsed.points.iter().map(|p| p.category.as_str()).collect();
        assert_eq!(cats, vec!["Listed Building", UNKNOWN_CATEGORY, "Battlefield"]);
    }

    #[test]
    fn test_short_rows_and_empty_rows() {
        let csv = "Name,Type,Latitude,Longitude,NHLE link\n\
                   A,Monument,51.0,0.5\n\
                   ,,,,\n\
                   B,Monument,51.0\n";
        let parsed = parser().parse(csv.as_bytes()).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.points[0].link, None);
        assert_eq!(parsed.row_errors.len(), 1);
        assert_eq!(parsed.row_errors[0].row, 3);
    }

    #[test]
    fn test_records_are_lazy() {
        let csv = "Name,Type,Latitude,Longitude\nA,Monument,51.0,0.0\nB,Monument,x,0.0\n";
        let p = parser();
        let mut records = p.records(csv.as_bytes()).unwrap();
        assert!(records.next().unwrap().is_ok());
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }
}
