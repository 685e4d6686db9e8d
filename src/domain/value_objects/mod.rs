pub mod asset_type;
