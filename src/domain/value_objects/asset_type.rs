//! Target-system asset taxonomy
//!
//! The target application classifies manual assets with a closed, integer-
//! coded taxonomy (the `asset_subclass_id` of its manual entry form). Only
//! the entries the classifier can actually select are modeled here.

/// An entry in the target system's manual-asset taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    /// 保証金・証拠金, used for all synced cash balances.
    CashDeposit,
    DomesticStock,
    UsStock,
    ChinaStock,
    ForeignStock,
    OtherStock,
    IndexOption,
    IndexFuture,
    CommodityFuture,
    Cfd,
    OtcForex,
    DomesticFund,
    ForeignFund,
    GovernmentBond,
    CorporateBond,
    ForeignBond,
    OtherBond,
}

impl AssetType {
    /// The form code the target system identifies this entry by.
    pub fn subclass_id(&self) -> u32 {
        match self {
            AssetType::CashDeposit => 51,
            AssetType::DomesticStock => 14,
            AssetType::UsStock => 15,
            AssetType::ChinaStock => 16,
            AssetType::ForeignStock => 55,
            AssetType::OtherStock => 17,
            AssetType::IndexOption => 23,
            AssetType::IndexFuture => 22,
            AssetType::CommodityFuture => 26,
            AssetType::Cfd => 24,
            AssetType::OtcForex => 18,
            AssetType::DomesticFund => 12,
            AssetType::ForeignFund => 52,
            AssetType::GovernmentBond => 7,
            AssetType::CorporateBond => 8,
            AssetType::ForeignBond => 9,
            AssetType::OtherBond => 11,
        }
    }

    /// Label as it appears in the target system's entry form.
    pub fn label(&self) -> &'static str {
        match self {
            AssetType::CashDeposit => "保証金・証拠金",
            AssetType::DomesticStock => "国内株",
            AssetType::UsStock => "米国株",
            AssetType::ChinaStock => "中国株",
            AssetType::ForeignStock => "外国株",
            AssetType::OtherStock => "その他株式",
            AssetType::IndexOption => "指数OP",
            AssetType::IndexFuture => "指数先物",
            AssetType::CommodityFuture => "商品先物",
            AssetType::Cfd => "CFD",
            AssetType::OtcForex => "店頭FX",
            AssetType::DomesticFund => "投資信託",
            AssetType::ForeignFund => "外国投資信託",
            AssetType::GovernmentBond => "国債",
            AssetType::CorporateBond => "社債",
            AssetType::ForeignBond => "外債",
            AssetType::OtherBond => "その他債券",
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.subclass_id())
    }
}
