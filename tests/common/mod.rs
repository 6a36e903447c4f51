#![allow(dead_code)]

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::Arc;
use viewtree::{Cardinality, Resource, ResourceType};

pub static ITEM: Lazy<Arc<ResourceType>> = Lazy::new(|| {
    Arc::new(
        ResourceType::new("Item")
            .view("default", ["name", "price"])
            .identify("default", ["id"])
            .identify("flat_db", ["id"]),
    )
});

pub static PERSON: Lazy<Arc<ResourceType>> = Lazy::new(|| {
    Arc::new(
        ResourceType::new("Person")
            .view("default", ["name", "age", "items"])
            .view("all", ["name", "age", "run_id"])
            .identify("flat_db", ["name", "run_id"])
            .relationship("items", "Item", Cardinality::Many),
    )
});

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub price: u32,
}

impl Item {
    pub fn new(id: u32, name: &str, price: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            price,
        }
    }
}

impl Resource for Item {
    fn resource_type(&self) -> Arc<ResourceType> {
        Arc::clone(&ITEM)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(json!(self.id)),
            "name" => Some(json!(self.name)),
            "price" => Some(json!(self.price)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: u32,
    pub run_id: u32,
    pub items: Vec<Item>,
}

impl Person {
    pub fn new(name: &str, age: u32, run_id: u32) -> Self {
        Self {
            name: name.to_string(),
            age,
            run_id,
            items: Vec::new(),
        }
    }
}

impl Resource for Person {
    fn resource_type(&self) -> Arc<ResourceType> {
        Arc::clone(&PERSON)
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(json!(self.name)),
            "age" => Some(json!(self.age)),
            "run_id" => Some(json!(self.run_id)),
            _ => None,
        }
    }

    fn related(&self, name: &str) -> Vec<&dyn Resource> {
        match name {
            "items" => self.items.iter().map(|item| item as &dyn Resource).collect(),
            _ => Vec::new(),
        }
    }
}

pub fn people() -> Vec<Person> {
    [("jon", 18), ("marc", 42), ("peter", 21)]
        .into_iter()
        .enumerate()
        .map(|(run_id, (name, age))| Person::new(name, age, run_id as u32))
        .collect()
}
