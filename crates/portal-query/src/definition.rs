//! Query definition model and copy-on-write transforms.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use portal_types::primary_key_attribute;

use crate::error::QueryError;
use crate::filter::{Condition, ConditionOperator, Filter, FilterKind};

fn first_page() -> u32 {
    1
}

/// Join kind of a linked entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Inner,
    Outer,
}

/// A selected attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A joined entity with its own attributes, filters and nested joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntity {
    /// Target entity type.
    pub name: String,
    /// Attribute on the target entity.
    pub from: String,
    /// Attribute on the enclosing entity.
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub link_type: JoinKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkEntity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LinkEntity {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            alias: None,
            link_type: JoinKind::Inner,
            attributes: Vec::new(),
            filters: Vec::new(),
            links: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_link_type(mut self, link_type: JoinKind) -> Self {
        self.link_type = link_type;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.attributes.iter().any(|a| a.name == name) {
            self.attributes.push(Attribute::new(name));
        }
        self
    }

    pub fn with_link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    /// Name under which this join's attributes appear in result rows.
    pub fn scope_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn find(&self, alias: &str) -> Option<&LinkEntity> {
        if self.scope_name() == alias {
            return Some(self);
        }
        self.links.iter().find_map(|l| l.find(alias))
    }

    fn find_mut(&mut self, alias: &str) -> Option<&mut LinkEntity> {
        if self.scope_name() == alias {
            return Some(self);
        }
        self.links.iter_mut().find_map(|l| l.find_mut(alias))
    }

    /// Merge attributes and nested joins of `other` that are missing here.
    fn merge(&mut self, other: LinkEntity) {
        for attribute in other.attributes {
            if !self.attributes.iter().any(|a| a.name == attribute.name) {
                self.attributes.push(attribute);
            }
        }
        for nested in other.links {
            match self.find_mut(nested.scope_name()) {
                Some(existing) => existing.merge(nested),
                None => self.links.push(nested),
            }
        }
    }
}

/// The root entity of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkEntity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Owner of a dotted result field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    /// Entity type that owns the attribute.
    pub entity: String,
    pub attribute: String,
    /// Join alias, `None` for root attributes.
    pub alias: Option<String>,
}

/// A structured entity fetch description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub entity: EntityNode,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_cookie: Option<String>,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryDefinition {
    /// Create a definition selecting the primary key of `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        let name = entity.into();
        let primary_key = primary_key_attribute(&name);
        Self {
            entity: EntityNode {
                name,
                attributes: vec![Attribute::new(primary_key)],
                filters: Vec::new(),
                links: Vec::new(),
                extra: Map::new(),
            },
            page: 1,
            paging_cookie: None,
            count: None,
            extra: Map::new(),
        }
    }

    /// Parse and validate a JSON definition.
    pub fn from_json(json: &str) -> Result<Self, QueryError> {
        let definition: QueryDefinition = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_json(&self) -> Result<String, QueryError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check structural invariants: page >= 1, unique attribute names per
    /// scope, unique join aliases across the tree, and filter conditions
    /// naming a plain attribute of their own scope.
    ///
    /// Whether that attribute exists on the entity is left to the result
    /// source, which owns the entity metadata.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.page == 0 {
            return Err(QueryError::Invalid("page must be >= 1".into()));
        }
        ensure_unique_attributes(&self.entity.name, &self.entity.attributes)?;
        ensure_scoped_conditions(&self.entity.name, &self.entity.filters)?;

        let mut aliases = HashSet::new();
        let mut stack: Vec<&LinkEntity> = self.entity.links.iter().collect();
        while let Some(link) = stack.pop() {
            if !aliases.insert(link.scope_name()) {
                return Err(QueryError::Invalid(format!(
                    "duplicate link alias: {}",
                    link.scope_name()
                )));
            }
            ensure_unique_attributes(link.scope_name(), &link.attributes)?;
            ensure_scoped_conditions(link.scope_name(), &link.filters)?;
            stack.extend(link.links.iter());
        }
        Ok(())
    }

    pub fn entity_name(&self) -> &str {
        &self.entity.name
    }

    pub fn primary_key_attribute(&self) -> String {
        primary_key_attribute(&self.entity.name)
    }

    pub fn page_size(&self) -> Option<u32> {
        self.count
    }

    pub fn contains_attribute(&self, name: &str) -> bool {
        self.entity.attributes.iter().any(|a| a.name == name)
    }

    /// True when a join with this alias (or entity name, for unaliased
    /// joins) exists anywhere in the join tree.
    pub fn contains_link(&self, alias: &str) -> bool {
        self.find_link(alias).is_some()
    }

    pub fn find_link(&self, alias: &str) -> Option<&LinkEntity> {
        self.entity.links.iter().find_map(|l| l.find(alias))
    }

    fn find_link_mut(&mut self, alias: &str) -> Option<&mut LinkEntity> {
        self.entity.links.iter_mut().find_map(|l| l.find_mut(alias))
    }

    pub fn with_attribute(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.contains_attribute(&name) {
            return self.clone();
        }
        let mut next = self.clone();
        next.entity.attributes.push(Attribute::new(name));
        next
    }

    pub fn with_attributes<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        for name in names {
            let name = name.into();
            if !next.contains_attribute(&name) {
                next.entity.attributes.push(Attribute::new(name));
            }
        }
        next
    }

    /// Add a root-level join. A join whose alias already exists is merged
    /// into the existing one instead of duplicated.
    pub fn with_link(&self, link: LinkEntity) -> Self {
        let mut next = self.clone();
        match next.find_link_mut(link.scope_name()) {
            Some(existing) => existing.merge(link),
            None => next.entity.links.push(link),
        }
        next
    }

    /// Add an attribute to an existing join.
    pub fn with_link_attribute(
        &self,
        alias: &str,
        name: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let name = name.into();
        let mut next = self.clone();
        let link = next.find_link_mut(alias).ok_or_else(|| QueryError::Lookup {
            alias: alias.to_string(),
        })?;
        if !link.attributes.iter().any(|a| a.name == name) {
            link.attributes.push(Attribute::new(name));
        }
        Ok(next)
    }

    /// Append a condition to the first top-level filter of `kind` in the
    /// target scope (the root entity, or the join named by `link_alias`),
    /// creating that filter if needed. Identical conditions are not
    /// duplicated.
    pub fn with_filter_condition(
        &self,
        kind: FilterKind,
        attribute: impl Into<String>,
        operator: ConditionOperator,
        values: Vec<String>,
        link_alias: Option<&str>,
    ) -> Result<Self, QueryError> {
        let condition = Condition::new(attribute, operator, values);
        let mut next = self.clone();

        let filters = match link_alias {
            Some(alias) => {
                &mut next
                    .find_link_mut(alias)
                    .ok_or_else(|| QueryError::Lookup {
                        alias: alias.to_string(),
                    })?
                    .filters
            }
            None => &mut next.entity.filters,
        };

        add_condition(filters, kind, condition, link_alias.unwrap_or(&self.entity.name));
        Ok(next)
    }

    /// Restrict the primary key to `ids`.
    pub fn with_id_filter<I, S>(&self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = ids.into_iter().map(Into::into).collect();
        let condition = Condition::new(self.primary_key_attribute(), ConditionOperator::In, values);
        let mut next = self.clone();
        add_condition(&mut next.entity.filters, FilterKind::And, condition, &self.entity.name);
        next
    }

    pub fn with_page_size(&self, count: u32) -> Self {
        let mut next = self.clone();
        next.count = Some(count);
        next
    }

    /// Definition for the page after this one, carrying the continuation
    /// cursor returned with the current page.
    pub fn for_next_page(&self, cursor: Option<&str>) -> Self {
        let mut next = self.clone();
        next.page = self.page.saturating_add(1);
        next.paging_cookie = cursor.map(str::to_string);
        next
    }

    /// Resolve a result field path (`attribute` or `alias.attribute`).
    pub fn resolve_field(&self, path: &str) -> Result<ResolvedField, QueryError> {
        match path.split_once('.') {
            None => Ok(ResolvedField {
                entity: self.entity.name.clone(),
                attribute: path.to_string(),
                alias: None,
            }),
            Some((alias, attribute)) => {
                let link = self.find_link(alias).ok_or_else(|| QueryError::Lookup {
                    alias: alias.to_string(),
                })?;
                Ok(ResolvedField {
                    entity: link.name.clone(),
                    attribute: attribute.to_string(),
                    alias: Some(alias.to_string()),
                })
            }
        }
    }

    /// Result field paths selected by this definition, root first, joins
    /// depth-first.
    pub fn field_paths(&self) -> Vec<String> {
        fn collect(link: &LinkEntity, out: &mut Vec<String>) {
            for attribute in &link.attributes {
                out.push(format!("{}.{}", link.scope_name(), attribute.name));
            }
            for nested in &link.links {
                collect(nested, out);
            }
        }

        let mut paths: Vec<String> = self
            .entity
            .attributes
            .iter()
            .map(|a| a.name.clone())
            .collect();
        for link in &self.entity.links {
            collect(link, &mut paths);
        }
        paths
    }
}

fn ensure_unique_attributes(scope: &str, attributes: &[Attribute]) -> Result<(), QueryError> {
    let mut seen = HashSet::new();
    for attribute in attributes {
        if !seen.insert(attribute.name.as_str()) {
            return Err(QueryError::Invalid(format!(
                "duplicate attribute {} in {}",
                attribute.name, scope
            )));
        }
    }
    Ok(())
}

/// Append `condition` to the first filter of `kind`, unless an identical
/// condition is already there.
fn add_condition(filters: &mut Vec<Filter>, kind: FilterKind, condition: Condition, scope: &str) {
    let index = match filters.iter().position(|f| f.kind == kind) {
        Some(index) => index,
        None => {
            filters.push(Filter::new(kind));
            filters.len() - 1
        }
    };
    let filter = &mut filters[index];
    if filter.conditions.iter().any(|c| c.same_as(&condition)) {
        return;
    }
    debug!(
        attribute = %condition.attribute,
        operator = %condition.operator,
        scope,
        "Adding filter condition"
    );
    filter.conditions.push(condition);
}

/// Conditions address attributes of the scope their filter sits in, so an
/// empty or alias-qualified attribute name cannot be evaluated.
fn ensure_scoped_conditions(scope: &str, filters: &[Filter]) -> Result<(), QueryError> {
    let mut stack: Vec<&Filter> = filters.iter().collect();
    while let Some(filter) = stack.pop() {
        for condition in &filter.conditions {
            let name = condition.attribute.trim();
            if name.is_empty() {
                return Err(QueryError::Invalid(format!(
                    "condition without attribute in {scope}"
                )));
            }
            if name.contains('.') {
                return Err(QueryError::Invalid(format!(
                    "condition attribute {name} is outside scope {scope}"
                )));
            }
        }
        stack.extend(filter.filters.iter());
    }
    Ok(())
}
