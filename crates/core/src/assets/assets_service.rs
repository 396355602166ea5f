use crate::errors::{Error, Result};

use super::assets_model::{Asset, PortfolioLine};
use super::assets_traits::AssetRepositoryTrait;

/// Loads an asset and checks it belongs to `user_id`.
///
/// Another user's asset is reported exactly like a missing one.
pub fn get_owned_asset(
    repository: &dyn AssetRepositoryTrait,
    user_id: i64,
    asset_id: i64,
) -> Result<Asset> {
    match repository.get_asset(asset_id) {
        Ok(asset) if asset.user_id == user_id => Ok(asset),
        Ok(_) => Err(Error::NotFound(format!("Asset {} not found", asset_id))),
        Err(e) if e.is_not_found() => Err(Error::NotFound(format!("Asset {} not found", asset_id))),
        Err(e) => Err(e),
    }
}

/// Open line (units > 0) of the asset holding `isin`, if any.
pub fn resolve_open_line<'a>(lines: &'a [PortfolioLine], isin: &str) -> Option<&'a PortfolioLine> {
    lines
        .iter()
        .find(|line| line.is_open() && line.isin.eq_ignore_ascii_case(isin))
}
