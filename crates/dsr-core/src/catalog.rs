//! 病种与选项目录

/// 登革出血热
pub const DENGUE: &str = "Sốt xuất huyết Dengue";

/// 手足口病
pub const HFMD: &str = "Tay - chân - miệng";

/// 登革出血热重症分级
pub const SEVERE_DENGUE: &str = "Sốt xuất huyết Dengue nặng";

/// 登革病例筛选使用的诊断片段
pub const DENGUE_MATCH: &str = "Sốt xuất huyết";

/// 死亡状态
pub const DECEASED: &str = "Tử vong";

/// 传染病周报/月报中逐列统计的病种
pub const REPORTABLE_DISEASES: [&str; 10] = [
    "Tả",
    "Thương hàn",
    DENGUE,
    "Viêm não Vi rút",
    HFMD,
    "Viêm màng não do Não mô cầu",
    "Sởi",
    "Viêm gan cấp tính",
    "Đậu mùa khỉ",
    "BTN nguy hiểm mới",
];

/// 病例录入可选的主要诊断
pub const DIAGNOSES: &[&str] = &[
    // A组
    "Dịch hạch",
    "Cúm A(H5N1)",
    "Cúm A(H7N9)",
    "Viêm đường hô hấp Trung đông (MERS-CoV)",
    "Ê-bô-la (Ebolla)",
    "Lát-sa (Lassa)",
    "Mác-bớt (Marburg)",
    "Sốt Tây sông Nin",
    "Sốt Vàng",
    "Than",
    "Bệnh truyền nhiễm nguy hiểm và Bệnh chưa rõ tác nhân gây bệnh",
    // B组
    "Bạch hầu",
    "Bệnh do liên cầu lợn ở người",
    "COVID-19",
    "Dại",
    "Ho gà",
    "Lao phổi",
    "Liệt mềm cấp nghi bại liệt",
    "Rubella (Rubeon)",
    "Sởi",
    "Sốt rét",
    DENGUE,
    "Tả",
    HFMD,
    "Thương hàn",
    "Thủy đậu",
    "Uốn ván sơ sinh",
    "Uốn ván khác",
    "Viêm gan vi rút A",
    "Viêm gan vi rút B",
    "Viêm gan vi rút C",
    "Viêm gan vi rút khác",
    "Viêm màng não do não mô cầu",
    "Viêm não Nhật bản",
    "Viêm não vi rút khác",
    "Xoắn khuẩn vàng da (Leptospira)",
    "Zika",
    "Chikungunya",
    // C组
    "Bệnh do vi rút Adeno",
    "Cúm",
    "Lỵ amíp",
    "Lỵ trực trùng",
    "Quai bị",
    "Tiêu chảy",
    // 其他
    "Thay đổi chẩn đoán- Bệnh không thuộc danh mục",
    "Đã điều tra nhưng không có ca bệnh trên địa bàn",
];

/// 病例当前状态
pub const STATUSES: [&str; 6] = [
    "Điều trị ngoại trú",
    "Điều trị nội trú",
    "Ra viện",
    DECEASED,
    "Chuyển viện",
    "Tình trạng khác",
];

/// 某病种可选的分级，没有分级的病种返回空切片
pub fn severity_options(diagnosis: &str) -> &'static [&'static str] {
    match diagnosis {
        DENGUE => &[
            "Sốt xuất huyết Dengue",
            "Sốt xuất huyết Dengue có dấu hiệu cảnh báo",
            SEVERE_DENGUE,
        ],
        HFMD => &["Độ 1", "Độ 2a", "Độ 2b", "Độ 3", "Độ 4"],
        _ => &[],
    }
}

/// 登革相关诊断（包含"Sốt xuất huyết"）
pub fn is_dengue_diagnosis(diagnosis: &str) -> bool {
    diagnosis.contains(DENGUE_MATCH)
}
