//! Associations between entities.

use serde::{Deserialize, Serialize};

/// Cardinality of an association, seen from its owning side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Foreign key on the owning side referencing one target.
    ManyToOne,
    /// Unique foreign key.
    OneToOne,
    /// Collection of targets holding a foreign key to the owner.
    OneToMany,
    /// Collection through a join table.
    ManyToMany,
}

/// Operations that cascade along an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CascadeStyle {
    /// Cascade merge; fetched by the merge internal profile.
    pub merge: bool,
    /// Cascade refresh; fetched by the refresh internal profile.
    pub refresh: bool,
}

/// An association from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Association name, unique among the associations of `from_entity`.
    pub name: String,
    /// Owning entity.
    pub from_entity: String,
    /// Target entity.
    pub to_entity: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Join column on the owning table.
    pub from_column: String,
    /// Join column on the target table.
    pub to_column: String,
    /// Cascaded operations.
    #[serde(default)]
    pub cascade: CascadeStyle,
}

impl RelationDef {
    fn new(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_column: impl Into<String>,
        to_entity: impl Into<String>,
        to_column: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            to_entity: to_entity.into(),
            cardinality,
            from_column: from_column.into(),
            to_column: to_column.into(),
            cascade: CascadeStyle::default(),
        }
    }

    /// Create a many-to-one association.
    pub fn many_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_column: impl Into<String>,
        to_entity: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self::new(name, from_entity, from_column, to_entity, to_column, Cardinality::ManyToOne)
    }

    /// Create a one-to-one association.
    pub fn one_to_one(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_column: impl Into<String>,
        to_entity: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self::new(name, from_entity, from_column, to_entity, to_column, Cardinality::OneToOne)
    }

    /// Create a one-to-many association.
    pub fn one_to_many(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        from_column: impl Into<String>,
        to_entity: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self::new(name, from_entity, from_column, to_entity, to_column, Cardinality::OneToMany)
    }

    /// Set the cascade style.
    pub fn with_cascade(mut self, cascade: CascadeStyle) -> Self {
        self.cascade = cascade;
        self
    }

    /// Whether the association targets a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self.cardinality, Cardinality::OneToMany | Cardinality::ManyToMany)
    }

    /// Get the inverse association (swapping owner and target).
    pub fn inverse(&self, name: impl Into<String>) -> Self {
        let cardinality = match self.cardinality {
            Cardinality::ManyToOne => Cardinality::OneToMany,
            Cardinality::OneToMany => Cardinality::ManyToOne,
            other => other,
        };
        Self {
            name: name.into(),
            from_entity: self.to_entity.clone(),
            to_entity: self.from_entity.clone(),
            cardinality,
            from_column: self.to_column.clone(),
            to_column: self.from_column.clone(),
            cascade: CascadeStyle::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_to_one() {
        let rel = RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");
        assert_eq!(rel.cardinality, Cardinality::ManyToOne);
        assert!(!rel.is_collection());
    }

    #[test]
    fn test_inverse_relation() {
        let rel = RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");
        let inverse = rel.inverse("orders");

        assert_eq!(inverse.from_entity, "Customer");
        assert_eq!(inverse.to_entity, "Order");
        assert_eq!(inverse.from_column, "id");
        assert_eq!(inverse.to_column, "customer_id");
        assert!(inverse.is_collection());
    }

    #[test]
    fn test_cascade_style() {
        let rel = RelationDef::one_to_many("lines", "Order", "id", "OrderLine", "order_id")
            .with_cascade(CascadeStyle {
                merge: true,
                refresh: false,
            });
        assert!(rel.cascade.merge);
        assert!(!rel.cascade.refresh);
    }
}
