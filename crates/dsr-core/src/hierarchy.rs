//! 行政区划树与权限范围解析

use std::collections::HashMap;

use crate::error::{DsrError, Result};
use crate::models::{AdminUnit, UnitLevel};

/// 报表分行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// 按病例所属乡（xa_id）
    Commune,
    /// 按病例登记的村名（dia_chi_ap）
    Hamlet,
}

/// 报表中逐行统计的下级单位
#[derive(Debug, Clone)]
pub struct ReportingUnits {
    pub units: Vec<AdminUnit>,
    pub grouping: Grouping,
}

impl ReportingUnits {
    /// 判断病例是否归属于该行
    pub fn matches(&self, unit: &AdminUnit, commune_id: i64, hamlet: Option<&str>) -> bool {
        match self.grouping {
            Grouping::Commune => unit.id == commune_id,
            Grouping::Hamlet => hamlet.map_or(false, |h| h.trim() == unit.name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// 行政区划树，构建一次后只读
#[derive(Debug, Clone, Default)]
pub struct UnitTree {
    units: HashMap<i64, AdminUnit>,
    children: HashMap<i64, Vec<i64>>,
}

impl UnitTree {
    pub fn new(units: Vec<AdminUnit>) -> Self {
        let units: HashMap<i64, AdminUnit> = units.into_iter().map(|u| (u.id, u)).collect();
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for unit in units.values() {
            if let Some(parent_id) = unit.parent_id {
                children.entry(parent_id).or_default().push(unit.id);
            }
        }
        // 子单位按名称排序，保证报表行序稳定
        for ids in children.values_mut() {
            ids.sort_by(|a, b| units[a].name.cmp(&units[b].name).then(a.cmp(b)));
        }
        Self { units, children }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&AdminUnit> {
        self.units.get(&id)
    }

    pub fn require(&self, id: i64) -> Result<&AdminUnit> {
        self.get(id)
            .ok_or_else(|| DsrError::NotFound(format!("đơn vị hành chính {}", id)))
    }

    /// 省级根节点
    pub fn root(&self) -> Option<&AdminUnit> {
        self.units
            .values()
            .filter(|u| u.parent_id.is_none() && u.level == UnitLevel::Province)
            .min_by_key(|u| u.id)
    }

    pub fn parent(&self, id: i64) -> Option<&AdminUnit> {
        self.get(id)?.parent_id.and_then(|p| self.get(p))
    }

    pub fn children(&self, id: i64) -> Vec<&AdminUnit> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.units.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn children_at(&self, id: i64, level: UnitLevel) -> Vec<&AdminUnit> {
        self.children(id).into_iter().filter(|u| u.level == level).collect()
    }

    pub fn has_children(&self, id: i64) -> bool {
        self.children.get(&id).map_or(false, |c| !c.is_empty())
    }

    /// 某级别的全部单位，按名称排序
    pub fn units_at(&self, level: UnitLevel) -> Vec<&AdminUnit> {
        let mut found: Vec<&AdminUnit> = self.units.values().filter(|u| u.level == level).collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found
    }

    /// 按名称查找单位（导入时使用）
    pub fn find_by_name(&self, name: &str, level: Option<UnitLevel>) -> Option<&AdminUnit> {
        let wanted = name.trim().to_lowercase();
        let mut matches: Vec<&AdminUnit> = self
            .units
            .values()
            .filter(|u| level.map_or(true, |l| u.level == l))
            .filter(|u| u.name.trim().to_lowercase() == wanted)
            .collect();
        matches.sort_by_key(|u| u.id);
        matches.into_iter().next()
    }

    /// 单位管辖的全部乡级单位ID
    ///
    /// 乡返回自身；其他级别取直接下属的乡，以及直接下属片区下的乡。
    pub fn commune_ids_under(&self, id: i64) -> Vec<i64> {
        let Some(unit) = self.get(id) else {
            return Vec::new();
        };
        if unit.level == UnitLevel::Commune {
            return vec![unit.id];
        }

        let mut ids = Vec::new();
        for child in self.children(id) {
            match child.level {
                UnitLevel::Commune => ids.push(child.id),
                UnitLevel::Region => ids.extend(
                    self.children_at(child.id, UnitLevel::Commune)
                        .into_iter()
                        .map(|c| c.id),
                ),
                _ => {}
            }
        }
        ids
    }

    /// unit_id 是否等于 scope_id 或位于其下
    pub fn is_within(&self, scope_id: i64, unit_id: i64) -> bool {
        let mut current = self.get(unit_id);
        while let Some(unit) = current {
            if unit.id == scope_id {
                return true;
            }
            current = unit.parent_id.and_then(|p| self.get(p));
        }
        false
    }

    /// 报表逐行统计的下级单位
    pub fn reporting_units(&self, id: i64) -> Result<ReportingUnits> {
        let unit = self.require(id)?;
        let reporting = match unit.level {
            UnitLevel::Commune => ReportingUnits {
                units: self
                    .children_at(id, UnitLevel::Hamlet)
                    .into_iter()
                    .cloned()
                    .collect(),
                grouping: Grouping::Hamlet,
            },
            UnitLevel::Region => ReportingUnits {
                units: self
                    .children_at(id, UnitLevel::Commune)
                    .into_iter()
                    .cloned()
                    .collect(),
                grouping: Grouping::Commune,
            },
            UnitLevel::Province => ReportingUnits {
                units: self.units_at(UnitLevel::Commune).into_iter().cloned().collect(),
                grouping: Grouping::Commune,
            },
            UnitLevel::Hamlet => ReportingUnits {
                units: Vec::new(),
                grouping: Grouping::Hamlet,
            },
        };
        Ok(reporting)
    }

    /// 报表表头左上角的上级机关名称
    pub fn parent_header_name(&self, unit: &AdminUnit, authority_name: &str) -> String {
        if unit.level == UnitLevel::Province {
            return authority_name.to_uppercase();
        }
        self.parent(unit.id)
            .map(|p| p.name.to_uppercase())
            .unwrap_or_else(|| authority_name.to_uppercase())
    }

    /// 检查整棵树：唯一省级根节点，且父节点级别高于子节点
    pub fn validate(&self) -> Result<()> {
        let roots: Vec<&AdminUnit> = self.units.values().filter(|u| u.parent_id.is_none()).collect();
        if roots.len() != 1 || roots[0].level != UnitLevel::Province {
            return Err(DsrError::Validation(format!(
                "Cây đơn vị phải có đúng một gốc cấp Tỉnh (hiện có {} gốc).",
                roots.len()
            )));
        }
        for unit in self.units.values() {
            if let Some(parent_id) = unit.parent_id {
                let parent = self.get(parent_id).ok_or_else(|| {
                    DsrError::Validation(format!(
                        "Đơn vị '{}' tham chiếu đơn vị cha không tồn tại.",
                        unit.name
                    ))
                })?;
                check_parent_level(unit.level, Some(parent))?;
            }
        }
        Ok(())
    }
}

/// 新建或修改单位时检查父单位
pub fn check_parent_level(level: UnitLevel, parent: Option<&AdminUnit>) -> Result<()> {
    match (level, parent) {
        (UnitLevel::Province, None) => Ok(()),
        (UnitLevel::Province, Some(_)) => Err(DsrError::Validation(
            "Đơn vị cấp Tỉnh không được có đơn vị cha.".to_string(),
        )),
        (_, None) => Err(DsrError::Validation(format!(
            "Đơn vị cấp {} phải có đơn vị cha.",
            level
        ))),
        (_, Some(parent)) if parent.level.is_above(level) => Ok(()),
        (_, Some(parent)) => Err(DsrError::Validation(format!(
            "Đơn vị cha '{}' (cấp {}) phải ở cấp cao hơn cấp {}.",
            parent.name, parent.level, level
        ))),
    }
}

/// 报表表头使用的单位名称
pub fn formatted_unit_name(unit: &AdminUnit) -> String {
    const REGION_PREFIXES: [&str; 5] = [
        "TTYT Khu vực",
        "Trung tâm y tế Khu vực",
        "Khu vực TTYT",
        "TTYT",
        "Khu vực",
    ];

    match unit.level {
        UnitLevel::Province => unit.name.to_uppercase(),
        UnitLevel::Region => {
            let lowered = unit.name.to_lowercase();
            let cleaned = REGION_PREFIXES
                .iter()
                .find(|prefix| lowered.starts_with(&prefix.to_lowercase()))
                .map(|prefix| {
                    unit.name
                        .chars()
                        .skip(prefix.chars().count())
                        .collect::<String>()
                        .trim()
                        .to_string()
                })
                .unwrap_or_else(|| unit.name.clone());
            format!("TRUNG TÂM Y TẾ {}", cleaned).to_uppercase()
        }
        UnitLevel::Commune => format!("TRẠM Y TẾ {}", unit.name).to_uppercase(),
        UnitLevel::Hamlet => unit.name.to_uppercase(),
    }
}

/// 评语中使用的单位名称
pub fn display_name(unit: &AdminUnit, province_display_name: &str) -> String {
    match unit.level {
        UnitLevel::Province => province_display_name.to_string(),
        UnitLevel::Region => unit.name.replace("Trung tâm Y tế", "").trim().to_string(),
        _ => unit.name.clone(),
    }
}
