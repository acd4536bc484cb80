//! Fetch configuration.
//!
//! Every setting is optional so that option sets can be layered: a call's
//! options are merged over the cached instance's options, and whatever is
//! still unset falls back to the defaults applied by
//! [`FetchOptions::resolve`].

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::UsageError;
use crate::{field::Field, path::DataPath};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchType {
    #[default]
    Default,
    Pagination,
}

/// Where the scroll origin of a paginated list sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StartFrom {
    Top,
    Bot,
}

/// How incoming items join the existing list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AddTo {
    Start,
    End,
    #[default]
    Reset,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSystem {
    /// Window size: how many items are evicted at once, and how many cached
    /// items make a snapshot.
    pub limit: Option<usize>,
    #[serde(skip)]
    pub cache: Option<Field<Vec<Value>>>,
}

impl CacheSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cache(mut self, cache: Field<Vec<Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn merge(&self, newer: &Self) -> Self {
        Self {
            limit: newer.limit.or(self.limit),
            cache: newer.cache.clone().or_else(|| self.cache.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataScope {
    pub start_from: Option<StartFrom>,
    pub top_percentage: Option<u8>,
    pub bot_percentage: Option<u8>,
    pub relative_params_key: Option<String>,
    pub up_or_down_params_key: Option<String>,
    pub is_have_more_res_key: Option<String>,
    #[serde(skip)]
    pub params: Option<Field<Map<String, Value>>>,
    pub how_much_getted_to_top: Option<u32>,
    pub item_key: Option<String>,
}

impl DataScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_from(mut self, start_from: StartFrom) -> Self {
        self.start_from = Some(start_from);
        self
    }

    pub fn top_percentage(mut self, percentage: u8) -> Self {
        self.top_percentage = Some(percentage);
        self
    }

    pub fn bot_percentage(mut self, percentage: u8) -> Self {
        self.bot_percentage = Some(percentage);
        self
    }

    pub fn relative_params_key(mut self, key: impl Into<String>) -> Self {
        self.relative_params_key = Some(key.into());
        self
    }

    pub fn up_or_down_params_key(mut self, key: impl Into<String>) -> Self {
        self.up_or_down_params_key = Some(key.into());
        self
    }

    pub fn is_have_more_res_key(mut self, key: impl Into<String>) -> Self {
        self.is_have_more_res_key = Some(key.into());
        self
    }

    pub fn params(mut self, params: Field<Map<String, Value>>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn how_much_getted_to_top(mut self, window: u32) -> Self {
        self.how_much_getted_to_top = Some(window);
        self
    }

    pub fn item_key(mut self, key: impl Into<String>) -> Self {
        self.item_key = Some(key.into());
        self
    }

    fn merge(&self, newer: &Self) -> Self {
        Self {
            start_from: newer.start_from.or(self.start_from),
            top_percentage: newer.top_percentage.or(self.top_percentage),
            bot_percentage: newer.bot_percentage.or(self.bot_percentage),
            relative_params_key: newer
                .relative_params_key
                .clone()
                .or_else(|| self.relative_params_key.clone()),
            up_or_down_params_key: newer
                .up_or_down_params_key
                .clone()
                .or_else(|| self.up_or_down_params_key.clone()),
            is_have_more_res_key: newer
                .is_have_more_res_key
                .clone()
                .or_else(|| self.is_have_more_res_key.clone()),
            params: newer.params.clone().or_else(|| self.params.clone()),
            how_much_getted_to_top: newer.how_much_getted_to_top.or(self.how_much_getted_to_top),
            item_key: newer.item_key.clone().or_else(|| self.item_key.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchAddTo {
    /// Dotted path of the list inside the fetched data, e.g. `page.items`.
    pub path: Option<String>,
    pub add_to: Option<AddTo>,
    pub is_set_reversed_arr: Option<bool>,
    pub is_set_prev_arr: Option<bool>,
    #[serde(skip)]
    pub set_array: Option<Field<Vec<Value>>>,
}

impl FetchAddTo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn add_to(mut self, add_to: AddTo) -> Self {
        self.add_to = Some(add_to);
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.is_set_reversed_arr = Some(reversed);
        self
    }

    pub fn prepend_to_previous(mut self, prepend: bool) -> Self {
        self.is_set_prev_arr = Some(prepend);
        self
    }

    pub fn set_array(mut self, target: Field<Vec<Value>>) -> Self {
        self.set_array = Some(target);
        self
    }

    fn merge(&self, newer: &Self) -> Self {
        Self {
            path: newer.path.clone().or_else(|| self.path.clone()),
            add_to: newer.add_to.or(self.add_to),
            is_set_reversed_arr: newer.is_set_reversed_arr.or(self.is_set_reversed_arr),
            is_set_prev_arr: newer.is_set_prev_arr.or(self.is_set_prev_arr),
            set_array: newer.set_array.clone().or_else(|| self.set_array.clone()),
        }
    }
}

/// Options of one fetch instance, as given by callers.
///
/// ```rust
/// use storekit::{AddTo, FetchAddTo, FetchOptions};
///
/// let options: FetchOptions = serde_json::from_str(
///     r#"{ "id": "feed", "fetchType": "pagination", "fetchAddTo": { "path": "items", "addTo": "end" } }"#,
/// )
/// .unwrap();
/// let resolved = options.resolve().unwrap();
/// assert_eq!(resolved.add_to, AddTo::End);
/// assert!(resolved.need_pending);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchOptions {
    pub id: Option<String>,
    pub fetch_type: Option<FetchType>,
    pub fetch_if_pending: Option<bool>,
    pub fetch_if_have_data: Option<bool>,
    pub is_set_data: Option<bool>,
    pub need_pending: Option<bool>,
    pub is_fetch_up: Option<bool>,
    #[serde(skip)]
    pub page: Option<Field<u64>>,
    pub cache_system: CacheSystem,
    pub data_scope: DataScope,
    pub fetch_add_to: FetchAddTo,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn fetch_type(mut self, fetch_type: FetchType) -> Self {
        self.fetch_type = Some(fetch_type);
        self
    }

    pub fn fetch_if_pending(mut self, allow: bool) -> Self {
        self.fetch_if_pending = Some(allow);
        self
    }

    pub fn fetch_if_have_data(mut self, allow: bool) -> Self {
        self.fetch_if_have_data = Some(allow);
        self
    }

    pub fn is_set_data(mut self, set: bool) -> Self {
        self.is_set_data = Some(set);
        self
    }

    pub fn need_pending(mut self, need: bool) -> Self {
        self.need_pending = Some(need);
        self
    }

    pub fn is_fetch_up(mut self, up: bool) -> Self {
        self.is_fetch_up = Some(up);
        self
    }

    /// Links a page counter incremented after each successful pagination
    /// fetch.
    pub fn page(mut self, page: Field<u64>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn cache_system(mut self, cache_system: CacheSystem) -> Self {
        self.cache_system = cache_system;
        self
    }

    pub fn data_scope(mut self, data_scope: DataScope) -> Self {
        self.data_scope = data_scope;
        self
    }

    pub fn fetch_add_to(mut self, fetch_add_to: FetchAddTo) -> Self {
        self.fetch_add_to = fetch_add_to;
        self
    }

    /// Layers `newer` over `self`, field by field and per nested group.
    pub fn merge(&self, newer: &FetchOptions) -> FetchOptions {
        FetchOptions {
            id: newer.id.clone().or_else(|| self.id.clone()),
            fetch_type: newer.fetch_type.or(self.fetch_type),
            fetch_if_pending: newer.fetch_if_pending.or(self.fetch_if_pending),
            fetch_if_have_data: newer.fetch_if_have_data.or(self.fetch_if_have_data),
            is_set_data: newer.is_set_data.or(self.is_set_data),
            need_pending: newer.need_pending.or(self.need_pending),
            is_fetch_up: newer.is_fetch_up.or(self.is_fetch_up),
            page: newer.page.clone().or_else(|| self.page.clone()),
            cache_system: self.cache_system.merge(&newer.cache_system),
            data_scope: self.data_scope.merge(&newer.data_scope),
            fetch_add_to: self.fetch_add_to.merge(&newer.fetch_add_to),
        }
    }

    /// Fills in defaults and validates the path and percentages.
    pub fn resolve(&self) -> Result<ResolvedOptions, UsageError> {
        let path = self
            .fetch_add_to
            .path
            .as_deref()
            .map(DataPath::parse)
            .transpose()?;

        let scope = &self.data_scope;
        for (name, value) in [
            ("top_percentage", scope.top_percentage),
            ("bot_percentage", scope.bot_percentage),
        ] {
            if let Some(value) = value.filter(|v| *v > 100) {
                return Err(UsageError::InvalidPercentage { name, value });
            }
        }

        Ok(ResolvedOptions {
            id: self.id.clone(),
            fetch_type: self.fetch_type.unwrap_or_default(),
            fetch_if_pending: self.fetch_if_pending.unwrap_or(false),
            fetch_if_have_data: self.fetch_if_have_data.unwrap_or(true),
            is_set_data: self.is_set_data.unwrap_or(true),
            need_pending: self.need_pending.unwrap_or(true),
            is_fetch_up: self.is_fetch_up.unwrap_or(false),
            page: self.page.clone(),
            limit: self.cache_system.limit,
            cache: self.cache_system.cache.clone(),
            start_from: scope.start_from,
            top_percentage: scope.top_percentage,
            bot_percentage: scope.bot_percentage,
            relative_params_key: scope.relative_params_key.clone(),
            up_or_down_params_key: scope.up_or_down_params_key.clone(),
            is_have_more_res_key: scope.is_have_more_res_key.clone(),
            params: scope.params.clone(),
            how_much_getted_to_top: scope.how_much_getted_to_top.unwrap_or(2),
            item_key: scope.item_key.clone().unwrap_or_else(|| "id".to_string()),
            path,
            add_to: self.fetch_add_to.add_to.unwrap_or_default(),
            is_set_reversed_arr: self.fetch_add_to.is_set_reversed_arr.unwrap_or(false),
            is_set_prev_arr: self.fetch_add_to.is_set_prev_arr.unwrap_or(false),
            set_array: self.fetch_add_to.set_array.clone(),
        })
    }
}

/// The effective options of one fetch call, with every default applied.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub id: Option<String>,
    pub fetch_type: FetchType,
    pub fetch_if_pending: bool,
    pub fetch_if_have_data: bool,
    pub is_set_data: bool,
    pub need_pending: bool,
    pub is_fetch_up: bool,
    pub page: Option<Field<u64>>,
    pub limit: Option<usize>,
    pub cache: Option<Field<Vec<Value>>>,
    pub start_from: Option<StartFrom>,
    pub top_percentage: Option<u8>,
    pub bot_percentage: Option<u8>,
    pub relative_params_key: Option<String>,
    pub up_or_down_params_key: Option<String>,
    pub is_have_more_res_key: Option<String>,
    pub params: Option<Field<Map<String, Value>>>,
    pub how_much_getted_to_top: u32,
    pub item_key: String,
    pub path: Option<DataPath>,
    pub add_to: AddTo,
    pub is_set_reversed_arr: bool,
    pub is_set_prev_arr: bool,
    pub set_array: Option<Field<Vec<Value>>>,
}
