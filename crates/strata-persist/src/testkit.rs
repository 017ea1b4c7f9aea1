//! Shared test fixtures: an ERM (entity-relationship) model and a small
//! company model with a v1 -> v2 data migration.

use std::sync::Arc;

use serde_json::json;

use strata_model::{ComponentDef, DomainModel, FieldKind, InterfaceDef, ScalarKind};
use strata_space::{FieldValue, ObjectHandle, ServiceHandle, Space, Universe};
use strata_store::SpaceStore;

use crate::persister::SpacePersister;

// ---------------------------------------------------------------------------
// ERM fixture
// ---------------------------------------------------------------------------

pub(crate) fn erm_model() -> Arc<DomainModel> {
    Arc::new(
        DomainModel::new("erm")
            .with_interface(
                InterfaceDef::new("erm.IEntity")
                    .with_field("name", FieldKind::Scalar(ScalarKind::Str))
                    .with_field("parent", FieldKind::Ref("erm.IEntity".into())),
            )
            .with_interface(
                InterfaceDef::new("erm.IRelationship")
                    .with_field("relation", FieldKind::Scalar(ScalarKind::Str))
                    .with_field("multiplicityA", FieldKind::ValueStruct)
                    .with_field("multiplicityB", FieldKind::ValueStruct)
                    .with_field("entityA", FieldKind::Ref("erm.IEntity".into()))
                    .with_field("entityB", FieldKind::Ref("erm.IEntity".into())),
            )
            .with_interface(
                InterfaceDef::new("erm.IModel")
                    .with_field("entities", FieldKind::RefArray("erm.IEntity".into()))
                    .with_field("relationships", FieldKind::RefArray("erm.IRelationship".into())),
            )
            .with_component(ComponentDef::new("erm.Entity").with_facet("entity", "erm.IEntity"))
            .with_component(
                ComponentDef::new("erm.Relationship").with_facet("relationship", "erm.IRelationship"),
            )
            .with_component(ComponentDef::new("erm.Model").with_facet("model", "erm.IModel")),
    )
}

pub(crate) fn mult(min: i64, max: i64) -> FieldValue {
    FieldValue::Value(json!({"min": min, "max": max}))
}

pub(crate) struct ErmFixture {
    pub universe: Arc<Universe>,
    pub space: Arc<Space>,
    pub root: ObjectHandle,
    pub model_svc: ServiceHandle,
}

impl ErmFixture {
    pub fn entities(&self) -> Vec<ServiceHandle> {
        entities_of(&self.space)
    }

    pub fn relationships(&self) -> Vec<ServiceHandle> {
        relationships_of(&self.space)
    }
}

/// The simple ERM graph of the original test suite: entities A, B, C and
/// relationships A-B, B-C, C-A with fixed multiplicities.
pub(crate) fn simple_erm() -> ErmFixture {
    let universe = Arc::new(Universe::new(erm_model()));
    let space = Arc::new(Space::new(&universe));

    let mut entity_services = Vec::new();
    for name in ["Entity A", "Entity B", "Entity C"] {
        let object = space.new_object("erm.Entity").unwrap();
        let service = space.service_at(object, "entity").unwrap();
        space.set_field(service, "name", FieldValue::str(name)).unwrap();
        entity_services.push(service);
    }

    let relationship = |relation: &str, a: ServiceHandle, b: ServiceHandle, ma: FieldValue, mb: FieldValue| {
        let object = space.new_object("erm.Relationship").unwrap();
        let service = space.service_at(object, "relationship").unwrap();
        space.set_field(service, "relation", FieldValue::str(relation)).unwrap();
        space.set_field(service, "entityA", FieldValue::Ref(Some(a))).unwrap();
        space.set_field(service, "entityB", FieldValue::Ref(Some(b))).unwrap();
        space.set_field(service, "multiplicityA", ma).unwrap();
        space.set_field(service, "multiplicityB", mb).unwrap();
        service
    };

    let rel_ab = relationship(
        "relation A-B",
        entity_services[0],
        entity_services[1],
        mult(0, 0),
        mult(1, 2),
    );
    let rel_bc = relationship(
        "relation B-C",
        entity_services[1],
        entity_services[2],
        mult(3, 4),
        mult(5, 6),
    );
    let rel_ca = relationship(
        "relation C-A",
        entity_services[2],
        entity_services[0],
        mult(7, 8),
        mult(9, 0),
    );

    let root = space.new_object("erm.Model").unwrap();
    let model_svc = space.service_at(root, "model").unwrap();
    space
        .set_field(model_svc, "entities", FieldValue::RefVec(entity_services))
        .unwrap();
    space
        .set_field(
            model_svc,
            "relationships",
            FieldValue::RefVec(vec![rel_ab, rel_bc, rel_ca]),
        )
        .unwrap();
    space.set_root_object(root).unwrap();

    ErmFixture {
        universe,
        space,
        root,
        model_svc,
    }
}

// ---------------------------------------------------------------------------
// Space readers shared by the scenario assertions
// ---------------------------------------------------------------------------

pub(crate) fn model_service(space: &Space) -> ServiceHandle {
    let root = space.root_object().expect("space has a root");
    space.service_at(root, "model").unwrap()
}

pub(crate) fn entities_of(space: &Space) -> Vec<ServiceHandle> {
    space
        .field(model_service(space), "entities")
        .unwrap()
        .as_ref_vec()
        .unwrap()
        .to_vec()
}

pub(crate) fn relationships_of(space: &Space) -> Vec<ServiceHandle> {
    space
        .field(model_service(space), "relationships")
        .unwrap()
        .as_ref_vec()
        .unwrap()
        .to_vec()
}

pub(crate) fn str_field(space: &Space, service: ServiceHandle, field: &str) -> String {
    space
        .field(service, field)
        .unwrap()
        .as_value()
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

pub(crate) fn int_field(space: &Space, service: ServiceHandle, field: &str) -> i64 {
    space
        .field(service, field)
        .unwrap()
        .as_value()
        .unwrap()
        .as_i64()
        .unwrap()
}

pub(crate) fn mult_field(space: &Space, service: ServiceHandle, field: &str) -> (i64, i64) {
    let value = space.field(service, field).unwrap();
    let payload = value.as_value().unwrap();
    (
        payload.get("min").and_then(|v| v.as_i64()).unwrap(),
        payload.get("max").and_then(|v| v.as_i64()).unwrap(),
    )
}

pub(crate) fn ref_field(
    space: &Space,
    service: ServiceHandle,
    field: &str,
) -> Option<ServiceHandle> {
    space.field(service, field).unwrap().as_ref_handle().unwrap()
}

pub(crate) fn refvec_field(space: &Space, service: ServiceHandle, field: &str) -> Vec<ServiceHandle> {
    space
        .field(service, field)
        .unwrap()
        .as_ref_vec()
        .unwrap()
        .to_vec()
}

// ---------------------------------------------------------------------------
// Company fixture (migration scenarios)
// ---------------------------------------------------------------------------

/// The v2 data migration: the employee hired at 4000 was given a raise.
pub(crate) const DOM_V2_SCRIPT: &str = r#"{"update": [
    {"op": "set_value", "interface": "dom.IEmployee", "field": "salary",
     "where": {"field": "salary", "equals": "4000"}, "to": "5000"}
]}"#;

pub(crate) fn dom_model(name: &str, updates: &[&str]) -> Arc<DomainModel> {
    let mut model = DomainModel::new(name)
        .with_interface(
            InterfaceDef::new("dom.ICompany")
                .with_field("products", FieldKind::RefArray("dom.IProduct".into()))
                .with_field("services", FieldKind::RefArray("dom.IService".into())),
        )
        .with_interface(
            InterfaceDef::new("dom.IProduct")
                .with_field("name", FieldKind::Scalar(ScalarKind::Str))
                .with_field("value", FieldKind::Scalar(ScalarKind::Int))
                .with_field("developers", FieldKind::RefArray("dom.IEmployee".into()))
                .with_field("leader", FieldKind::Ref("dom.IEmployee".into())),
        )
        .with_interface(
            InterfaceDef::new("dom.IService")
                .with_field("name", FieldKind::Scalar(ScalarKind::Str))
                .with_field("monthlyIncome", FieldKind::Scalar(ScalarKind::Int))
                .with_field("mantainers", FieldKind::RefArray("dom.IEmployee".into())),
        )
        .with_interface(
            InterfaceDef::new("dom.IEmployee")
                .with_field("name", FieldKind::Scalar(ScalarKind::Str))
                .with_field("salary", FieldKind::Scalar(ScalarKind::Int))
                .with_field("role", FieldKind::Scalar(ScalarKind::Str)),
        )
        .with_component(ComponentDef::new("dom.Company").with_facet("company", "dom.ICompany"))
        .with_component(ComponentDef::new("dom.Product").with_facet("product", "dom.IProduct"))
        .with_component(ComponentDef::new("dom.Service").with_facet("service", "dom.IService"))
        .with_component(ComponentDef::new("dom.Employee").with_facet("employee", "dom.IEmployee"));
    for update in updates {
        model = model.with_update(*update);
    }
    Arc::new(model)
}

pub(crate) struct CompanyFixture {
    pub space: Arc<Space>,
    pub root: ObjectHandle,
}

pub(crate) fn company_space(universe: &Universe) -> CompanyFixture {
    let space = Arc::new(Space::new(universe));

    let employee = |name: &str, salary: i64, role: &str| {
        let object = space.new_object("dom.Employee").unwrap();
        let service = space.service_at(object, "employee").unwrap();
        space.set_field(service, "name", FieldValue::str(name)).unwrap();
        space.set_field(service, "salary", FieldValue::int(salary)).unwrap();
        space.set_field(service, "role", FieldValue::str(role)).unwrap();
        service
    };

    let joseph = employee("Joseph Java Newbie", 1000, "Developer");
    let michael = employee("Michael CSharp Senior", 4000, "Developer");
    let richard = employee("Richard Scrum Master", 10000, "Manager");
    let john = employee("John Cplusplus Experienced", 5000, "Developer");
    let jacob = employee("Jacob Lua Junior", 3000, "Developer");

    let product_obj = space.new_object("dom.Product").unwrap();
    let product = space.service_at(product_obj, "product").unwrap();
    space.set_field(product, "name", FieldValue::str("Software2.0")).unwrap();
    space.set_field(product, "value", FieldValue::int(1_000_000)).unwrap();
    space
        .set_field(product, "developers", FieldValue::RefVec(vec![joseph, michael]))
        .unwrap();
    space.set_field(product, "leader", FieldValue::Ref(Some(richard))).unwrap();

    let service_obj = space.new_object("dom.Service").unwrap();
    let maintenance = space.service_at(service_obj, "service").unwrap();
    space
        .set_field(maintenance, "name", FieldValue::str("Software1.0 Maintenance"))
        .unwrap();
    space
        .set_field(maintenance, "monthlyIncome", FieldValue::int(50_000))
        .unwrap();
    space
        .set_field(maintenance, "mantainers", FieldValue::RefVec(vec![john, jacob]))
        .unwrap();

    let root = space.new_object("dom.Company").unwrap();
    let company = space.service_at(root, "company").unwrap();
    space.set_field(company, "products", FieldValue::RefVec(vec![product])).unwrap();
    space
        .set_field(company, "services", FieldValue::RefVec(vec![maintenance]))
        .unwrap();
    space.set_root_object(root).unwrap();

    CompanyFixture { space, root }
}

// ---------------------------------------------------------------------------
// Persister wiring
// ---------------------------------------------------------------------------

pub(crate) fn persister(store: Arc<dyn SpaceStore>, universe: Arc<Universe>) -> SpacePersister {
    let mut persister = SpacePersister::new();
    persister.wire_store(store);
    persister.wire_universe(universe);
    persister
}
