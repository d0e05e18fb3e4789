//! Integration tests for schema compilation.

use serde_json::{json, Value};
use docschema::{
    compile, compile_with_callback, CompileError, CompileOptions, ErrorKind, FieldKind,
    IndexDirection, PrimitiveType, SchemaTree, ValidatorRegistry,
};

fn person_spec() -> Value {
    json!({
        "swagger": "2.0",
        "x-swagger-mongoose": {
            "validators": "lib/validators"
        },
        "definitions": {
            "Person": {
                "required": ["login"],
                "properties": {
                    "_id": { "type": "string" },
                    "__v": { "type": "integer" },
                    "login": {
                        "type": "string",
                        "x-swagger-mongoose": { "unique": true }
                    },
                    "firstName": { "type": "string" },
                    "lastName": { "type": "string" },
                    "houses": {
                        "type": "array",
                        "items": {
                            "$ref": "#/definitions/House",
                            "x-swagger-mongoose": { "type": "objectId" }
                        }
                    },
                    "cars": {
                        "type": "array",
                        "items": {
                            "$ref": "#/definitions/Car",
                            "x-swagger-mongoose": { "type": "objectId" }
                        }
                    },
                    "phone": {
                        "type": "object",
                        "properties": {
                            "home": {
                                "type": "string",
                                "x-swagger-mongoose": { "validator": "homePhone" }
                            },
                            "mobile": { "type": "string" }
                        }
                    }
                }
            },
            "House": {
                "properties": {
                    "description": { "type": "string" },
                    "lng": { "type": "number" },
                    "lat": { "type": "number" }
                },
                "x-swagger-mongoose": {
                    "index": { "location": { "lng": 1, "lat": 1 } }
                }
            },
            "Car": {
                "properties": {
                    "provider": { "type": "string", "enum": ["Mazda", "Toyota", "Tesla"] },
                    "model": { "type": "string" }
                }
            },
            "Human": {
                "properties": {
                    "firstName": { "type": "string" },
                    "lastName": { "type": "string" },
                    "father": { "$ref": "#/definitions/Human" },
                    "mother": { "$ref": "#/definitions/Human" }
                },
                "x-swagger-mongoose": {
                    "index": { "name": { "firstName": 1, "lastName": 1, "unique": true } }
                }
            }
        }
    })
}

fn pet_spec() -> Value {
    json!({
        "swagger": "2.0",
        "definitions": {
            "Pet": {
                "required": ["id", "name"],
                "properties": {
                    "id": { "type": "integer", "format": "int64" },
                    "name": { "type": "string" },
                    "dob": { "type": "date" },
                    "price": { "type": "number", "format": "double" },
                    "sold": { "type": "boolean" },
                    "friends": { "type": "array", "items": { "type": "string" } },
                    "favoriteNumbers": { "type": "array", "items": { "type": "integer" } },
                    "address": {
                        "type": "array",
                        "items": { "$ref": "#/definitions/Address" }
                    }
                }
            },
            "Address": {
                "type": "object",
                "properties": {
                    "addressLine1": { "type": "string" },
                    "addressLine2": { "type": "string" }
                }
            },
            "Error": {
                "required": ["code"],
                "properties": {
                    "code": { "type": "integer" },
                    "message": { "type": "string" }
                }
            }
        }
    })
}

fn person_options() -> CompileOptions {
    let validators = ValidatorRegistry::new().register(
        "homePhone",
        "{VALUE} is not a valid home phone number!",
        |v| {
            v.as_str()
                .map(|s| s.chars().filter(|c| c.is_ascii_digit()).count() == 10)
                .unwrap_or(false)
        },
    );
    CompileOptions::new().validators(validators)
}

fn tree(spec: Value, options: &CompileOptions, name: &str) -> SchemaTree {
    let schemas = compile(spec, options).unwrap();
    schemas.get(name).unwrap().tree.clone()
}

// === Document Normalization Tests ===

mod normalization {
    use super::*;

    #[test]
    fn text_bytes_and_value_compile_identically() {
        let text = pet_spec().to_string();
        let options = CompileOptions::new();

        let from_value = compile(pet_spec(), &options).unwrap();
        let from_text = compile(text.as_str(), &options).unwrap();
        let from_bytes = compile(text.into_bytes(), &options).unwrap();

        assert_eq!(from_value, from_text);
        assert_eq!(from_value, from_bytes);
    }

    #[test]
    fn missing_spec_errors() {
        let result = compile("", &CompileOptions::new());
        assert!(matches!(result, Err(CompileError::MissingSpec)));

        let result = compile(Value::Null, &CompileOptions::new());
        assert!(matches!(result, Err(CompileError::MissingSpec)));
    }

    #[test]
    fn unparseable_spec_errors() {
        let result = compile("{\"definitions\": ", &CompileOptions::new());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ParseError);

        let result = compile(json!([1, 2]), &CompileOptions::new());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ParseError);
    }
}

// === Output Shape Tests ===

mod output {
    use super::*;

    #[test]
    fn keys_follow_definition_order() {
        let schemas = compile(person_spec(), &person_options()).unwrap();
        assert_eq!(
            schemas.names().collect::<Vec<_>>(),
            vec!["Person", "House", "Car", "Human"]
        );
    }

    #[test]
    fn fields_follow_declaration_order() {
        let pet = tree(pet_spec(), &CompileOptions::new(), "Pet");
        let fields: Vec<&str> = pet.fields().unwrap().keys().collect();
        assert_eq!(
            fields,
            vec!["id", "name", "dob", "price", "sold", "friends", "favoriteNumbers", "address"]
        );
    }

    #[test]
    fn pet_field_types() {
        let pet = tree(pet_spec(), &CompileOptions::new(), "Pet");

        assert_eq!(pet.field("id").unwrap().primitive(), Some(PrimitiveType::Number));
        assert_eq!(pet.field("dob").unwrap().primitive(), Some(PrimitiveType::Date));
        assert_eq!(pet.field("sold").unwrap().primitive(), Some(PrimitiveType::Boolean));

        let numbers = pet.field("favoriteNumbers").unwrap().items().unwrap();
        assert_eq!(numbers.primitive(), Some(PrimitiveType::Number));

        let address = pet.field("address").unwrap().items().unwrap();
        let address_fields = address.fields().unwrap();
        assert_eq!(
            address_fields.keys().collect::<Vec<_>>(),
            vec!["addressLine1", "addressLine2"]
        );
    }

    #[test]
    fn compiled_schemas_serialize() {
        let schemas = compile(person_spec(), &person_options()).unwrap();
        let value = serde_json::to_value(&schemas).unwrap();

        assert_eq!(
            value["Human"]["fields"]["father"],
            json!({"type": "ObjectId", "identifierRef": true, "targetType": "Human"})
        );
        assert_eq!(
            value["Person"]["fields"]["login"],
            json!({"type": "String", "required": true, "unique": true})
        );
        assert_eq!(
            value["Human"]["indexes"][0],
            json!([{"firstName": 1, "lastName": 1}, {"unique": true, "background": true}])
        );
        assert_eq!(value["Car"]["validatorModule"], "lib/validators");
    }

    #[test]
    fn deterministic_output() {
        let first = compile(person_spec(), &person_options()).unwrap();
        let second = compile(person_spec(), &person_options()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn reserved_fields_never_emitted() {
        let person = tree(person_spec(), &person_options(), "Person");
        assert!(person.field("_id").is_none());
        assert!(person.field("__v").is_none());
        assert!(person.field("login").is_some());
    }

    #[test]
    fn reserved_fields_dropped_in_embedded_objects() {
        let spec = json!({
            "definitions": {
                "Doc": {
                    "properties": {
                        "meta": {
                            "type": "object",
                            "properties": {
                                "_id": { "type": "string" },
                                "tag": { "type": "string" }
                            }
                        }
                    }
                }
            }
        });
        let doc = tree(spec, &CompileOptions::new(), "Doc");
        let meta = doc.field("meta").unwrap().fields().unwrap();
        assert!(!meta.contains("_id"));
        assert!(meta.contains("tag"));
    }
}

// === Required Propagation Tests ===

mod required {
    use super::*;

    #[test]
    fn listed_fields_are_required() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "required": ["name"],
                    "properties": {
                        "id": { "type": "integer" },
                        "name": { "type": "string" }
                    }
                }
            }
        });
        let person = tree(spec, &CompileOptions::new(), "Person");
        assert!(person.field("name").unwrap().required);
        assert!(!person.field("id").unwrap().required);
    }

    #[test]
    fn embedded_object_uses_its_own_required_list() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "required": ["phone"],
                    "properties": {
                        "phone": {
                            "type": "object",
                            "required": ["mobile"],
                            "properties": {
                                "home": { "type": "string" },
                                "mobile": { "type": "string" }
                            }
                        }
                    }
                }
            }
        });
        let person = tree(spec, &CompileOptions::new(), "Person");
        let phone = person.field("phone").unwrap();
        assert!(phone.required);
        let fields = phone.fields().unwrap();
        assert!(fields.get("mobile").unwrap().required);
        assert!(!fields.get("home").unwrap().required);
    }

    #[test]
    fn referenced_type_keeps_its_own_required_list() {
        let pet = tree(pet_spec(), &CompileOptions::new(), "Pet");
        let address = pet.field("address").unwrap();
        assert!(!address.required);
        let fields = address.items().unwrap().fields().unwrap();
        assert!(!fields.get("addressLine1").unwrap().required);
    }
}

// === Enum Tests ===

mod enums {
    use super::*;

    #[test]
    fn enum_values_kept_in_order() {
        let car = tree(person_spec(), &person_options(), "Car");
        let provider = car.field("provider").unwrap();
        assert_eq!(
            provider.enum_values().unwrap(),
            &[json!("Mazda"), json!("Toyota"), json!("Tesla")]
        );
        assert!(car.field("model").unwrap().enum_values().is_none());
    }

    #[test]
    fn enum_on_array_items() {
        let spec = json!({
            "definitions": {
                "Post": {
                    "properties": {
                        "tags": {
                            "type": "array",
                            "items": { "type": "string", "enum": ["C", "A", "B"] }
                        }
                    }
                }
            }
        });
        let post = tree(spec, &CompileOptions::new(), "Post");
        let item = post.field("tags").unwrap().items().unwrap();
        assert_eq!(
            item.enum_values().unwrap(),
            &[json!("C"), json!("A"), json!("B")]
        );
    }
}

// === Reference Tests ===

mod references {
    use super::*;

    #[test]
    fn self_reference_is_identifier_ref() {
        let human = tree(person_spec(), &person_options(), "Human");
        for parent in ["father", "mother"] {
            let field = human.field(parent).unwrap();
            assert!(field.is_reference(), "{parent}");
            assert_eq!(field.target_type(), Some("Human"));
        }
    }

    #[test]
    fn self_reference_array_is_array_of_identifier_refs() {
        let spec = json!({
            "definitions": {
                "Human": {
                    "properties": {
                        "children": {
                            "type": "array",
                            "items": { "$ref": "#/definitions/Human" }
                        }
                    }
                }
            }
        });
        let human = tree(spec, &CompileOptions::new(), "Human");
        let child = human.field("children").unwrap().items().unwrap();
        assert_eq!(child.target_type(), Some("Human"));
    }

    #[test]
    fn array_of_ref_embeds_target() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "properties": {
                        "houses": {
                            "type": "array",
                            "items": { "$ref": "#/definitions/House" }
                        }
                    }
                },
                "House": {
                    "properties": {
                        "lng": { "type": "number" },
                        "lat": { "type": "number" }
                    }
                }
            }
        });
        let person = tree(spec, &CompileOptions::new(), "Person");
        let house = person.field("houses").unwrap().items().unwrap();
        let fields = house.fields().unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["lng", "lat"]);
    }

    #[test]
    fn array_of_ref_with_object_id_override() {
        let person = tree(person_spec(), &person_options(), "Person");

        let houses = person.field("houses").unwrap().items().unwrap();
        assert!(houses.is_reference());
        assert_eq!(houses.target_type(), Some("House"));

        let cars = person.field("cars").unwrap().items().unwrap();
        assert_eq!(cars.target_type(), Some("Car"));
    }

    #[test]
    fn two_type_cycle_terminates() {
        let spec = json!({
            "definitions": {
                "Author": {
                    "properties": {
                        "name": { "type": "string" },
                        "latest": { "$ref": "#/definitions/Book" }
                    }
                },
                "Book": {
                    "properties": {
                        "title": { "type": "string" },
                        "author": { "$ref": "#/definitions/Author" }
                    }
                }
            }
        });
        let schemas = compile(spec, &CompileOptions::new()).unwrap();

        let author = &schemas.get("Author").unwrap().tree;
        let latest = author.field("latest").unwrap().fields().unwrap();
        assert!(latest.contains("title"));
        assert_eq!(latest.get("author").unwrap().target_type(), Some("Author"));

        let book = &schemas.get("Book").unwrap().tree;
        let author = book.field("author").unwrap().fields().unwrap();
        assert_eq!(author.get("latest").unwrap().target_type(), Some("Book"));
    }

    #[test]
    fn three_type_cycle_terminates() {
        let spec = json!({
            "definitions": {
                "A": { "properties": { "b": { "$ref": "#/definitions/B" } } },
                "B": { "properties": { "c": { "$ref": "#/definitions/C" } } },
                "C": { "properties": { "a": { "$ref": "#/definitions/A" } } }
            }
        });
        let a = tree(spec, &CompileOptions::new(), "A");
        let c = a
            .field("b")
            .and_then(|b| b.fields())
            .and_then(|b| b.get("c"))
            .and_then(|c| c.fields())
            .unwrap();
        assert_eq!(c.get("a").unwrap().target_type(), Some("A"));
    }

    #[test]
    fn unresolved_ref_errors() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "properties": { "car": { "$ref": "#/definitions/Car" } }
                }
            }
        });
        let result = compile(spec, &CompileOptions::new());
        assert!(matches!(
            result,
            Err(CompileError::UnresolvedRef { path, reference })
                if path == "/definitions/Person/properties/car"
                    && reference == "#/definitions/Car"
        ));
    }

    #[test]
    fn excluded_type_is_still_a_ref_target() {
        let spec = json!({
            "swagger": "2.0",
            "definitions": {
                "Person": {
                    "properties": { "address": { "$ref": "#/definitions/Address" } }
                },
                "Address": {
                    "properties": { "city": { "type": "string" } },
                    "x-swagger-mongoose": { "exclude-schema": true }
                }
            }
        });
        let schemas = compile(spec, &CompileOptions::new()).unwrap();
        assert!(schemas.get("Address").is_none());
        assert_eq!(schemas.len(), 1);

        let person = &schemas.get("Person").unwrap().tree;
        assert!(person.field("address").unwrap().fields().unwrap().contains("city"));
    }
}

// === Override Tests ===

mod overrides {
    use super::*;

    #[test]
    fn field_directive_attributes_carried() {
        let person = tree(person_spec(), &person_options(), "Person");
        let login = person.field("login").unwrap();
        assert_eq!(login.primitive(), Some(PrimitiveType::String));
        assert_eq!(login.attributes["unique"], json!(true));
        assert!(login.required);
    }

    #[test]
    fn validator_binding_keeps_declared_type() {
        let person = tree(person_spec(), &person_options(), "Person");
        let home = person
            .field("phone")
            .and_then(|p| p.fields())
            .and_then(|p| p.get("home"))
            .unwrap();
        assert_eq!(home.primitive(), Some(PrimitiveType::String));
        assert_eq!(home.validator.as_ref().unwrap().name, "homePhone");
    }

    #[test]
    fn missing_validator_errors() {
        let result = compile(person_spec(), &CompileOptions::new());
        assert!(matches!(
            result,
            Err(CompileError::ValidatorNotFound { name, .. }) if name == "homePhone"
        ));
    }

    #[test]
    fn registered_validator_is_usable() {
        let options = person_options();
        let validator = options.validators.get("homePhone").unwrap();
        assert!(validator.check(&json!("(123) 456-7890")).is_ok());
        let message = validator.check(&json!("(123) 456-789")).unwrap_err();
        assert!(message.contains("is not a valid home phone number!"));
    }

    #[test]
    fn object_id_override_on_direct_ref() {
        let spec = json!({
            "swagger": "2.0",
            "definitions": {
                "Car": { "properties": { "model": { "type": "string" } } },
                "Person": {
                    "properties": {
                        "car": {
                            "$ref": "#/definitions/Car",
                            "x-swagger-mongoose": { "type": "objectId" }
                        }
                    }
                }
            }
        });
        let person = tree(spec, &CompileOptions::new(), "Person");
        let car = person.field("car").unwrap();
        assert!(matches!(&car.kind, FieldKind::Reference { target } if target.as_deref() == Some("Car")));
    }

    #[test]
    fn overlay_on_array_keeps_items_object_id() {
        let options = person_options().overlay(json!({
            "Person.houses": { "required": true }
        }));
        let person = tree(person_spec(), &options, "Person");
        let houses = person.field("houses").unwrap();

        assert!(houses.required);
        let item = houses.items().unwrap();
        assert!(item.is_reference());
        assert_eq!(item.target_type(), Some("House"));

        let value = serde_json::to_value(houses).unwrap();
        assert_eq!(
            value,
            json!({
                "type": [{"type": "ObjectId", "identifierRef": true, "targetType": "House"}],
                "required": true
            })
        );
    }

    #[test]
    fn array_definition_keeps_items_object_id() {
        let mut spec = person_spec();
        spec["definitions"]["Houses"] = json!({
            "type": "array",
            "items": {
                "$ref": "#/definitions/House",
                "x-swagger-mongoose": { "type": "objectId" }
            }
        });
        let houses = tree(spec, &person_options(), "Houses");
        let value = serde_json::to_value(&houses).unwrap();
        assert_eq!(
            value,
            json!({
                "type": [{"type": "ObjectId", "identifierRef": true, "targetType": "House"}]
            })
        );
    }

    #[test]
    fn ref_to_array_definition_keeps_items_object_id() {
        let mut spec = person_spec();
        spec["definitions"]["Houses"] = json!({
            "type": "array",
            "items": {
                "$ref": "#/definitions/House",
                "x-swagger-mongoose": { "type": "objectId" }
            }
        });
        spec["definitions"]["Street"] = json!({
            "properties": { "houses": { "$ref": "#/definitions/Houses" } }
        });
        let street = tree(spec, &person_options(), "Street");
        let item = street.field("houses").unwrap().items().unwrap();
        assert_eq!(item.target_type(), Some("House"));
    }

    #[test]
    fn legacy_documents_use_legacy_key() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "properties": {
                        "login": {
                            "type": "string",
                            "x-mongoose": { "unique": true },
                            "x-swagger-mongoose": { "lowercase": true }
                        }
                    }
                }
            }
        });
        let person = tree(spec, &CompileOptions::new(), "Person");
        let login = person.field("login").unwrap();
        assert_eq!(login.attributes["unique"], json!(true));
        assert!(!login.attributes.contains_key("lowercase"));
    }
}

// === Index Tests ===

mod indexes {
    use super::*;

    #[test]
    fn compound_unique_index() {
        let schemas = compile(person_spec(), &person_options()).unwrap();
        let human = schemas.get("Human").unwrap();
        assert_eq!(human.indexes.len(), 1);
        let index = &human.indexes[0];
        assert_eq!(
            index.fields,
            vec![
                ("firstName".to_string(), IndexDirection::Ascending),
                ("lastName".to_string(), IndexDirection::Ascending)
            ]
        );
        assert!(index.unique);
        assert!(index.background);
    }

    #[test]
    fn compound_index_without_unique() {
        let schemas = compile(person_spec(), &person_options()).unwrap();
        let house = schemas.get("House").unwrap();
        assert_eq!(house.indexes.len(), 1);
        assert!(!house.indexes[0].unique);
        assert_eq!(
            house.indexes[0].field_names().collect::<Vec<_>>(),
            vec!["lng", "lat"]
        );
    }

    #[test]
    fn unique_single_field_index_separate_from_field() {
        let spec = json!({
            "swagger": "2.0",
            "definitions": {
                "Person": {
                    "properties": { "login": { "type": "string" } },
                    "x-swagger-mongoose": {
                        "index": { "fields": { "login": 1 }, "unique": true }
                    }
                }
            }
        });
        let schemas = compile(spec, &CompileOptions::new()).unwrap();
        let person = schemas.get("Person").unwrap();

        assert_eq!(person.indexes.len(), 1);
        assert!(person.indexes[0].unique);
        assert!(!person.indexes[0].is_compound());

        let login = person.tree.field("login").unwrap();
        assert!(login.attributes.is_empty());
        assert_eq!(login.primitive(), Some(PrimitiveType::String));
    }

    #[test]
    fn types_without_indexes_have_none() {
        let schemas = compile(person_spec(), &person_options()).unwrap();
        assert!(schemas.get("Car").unwrap().indexes.is_empty());
    }
}

// === Overlay Tests ===

mod overlay {
    use super::*;

    #[test]
    fn overlay_overrides_field_declaration() {
        let mut spec = person_spec();
        spec["definitions"]["Person"]["properties"]["login"]["x-swagger-mongoose"] =
            json!({ "validator": "loginCheck", "unique": false });

        let options = person_options().overlay(json!({
            "Person.login": { "validator": null, "unique": true }
        }));
        let person = tree(spec, &options, "Person");
        let login = person.field("login").unwrap();

        assert_eq!(login.attributes["unique"], json!(true));
        assert!(login.validator.is_none());
        assert_eq!(login.primitive(), Some(PrimitiveType::String));
    }

    #[test]
    fn overlay_bad_path_errors() {
        let options = person_options().overlay(json!({ "Person.nickname": { "unique": true } }));
        let result = compile(person_spec(), &options);
        assert!(matches!(
            result,
            Err(CompileError::BadRefPath { path }) if path == "Person.nickname"
        ));
    }

    #[test]
    fn default_options_apply_to_every_type() {
        let options = CompileOptions::new().overlay(json!({ "default": { "timestamps": true } }));
        let schemas = compile(pet_spec(), &options).unwrap();
        for schema in schemas.iter() {
            assert_eq!(schema.options["timestamps"], json!(true), "{}", schema.name);
        }
    }

    #[test]
    fn per_type_options_override_default() {
        let options = CompileOptions::new().overlay(json!({
            "default": { "schema-options": { "timestamps": true } },
            "Pet": { "schema-options": { "timestamps": false } }
        }));
        let schemas = compile(pet_spec(), &options).unwrap();
        assert_eq!(schemas.get("Pet").unwrap().options["timestamps"], json!(false));
        assert_eq!(schemas.get("Error").unwrap().options["timestamps"], json!(true));

        let options = CompileOptions::new().overlay(json!({
            "default": { "schema-options": { "timestamps": false } },
            "Pet": { "schema-options": { "timestamps": true } }
        }));
        let schemas = compile(pet_spec(), &options).unwrap();
        assert_eq!(schemas.get("Pet").unwrap().options["timestamps"], json!(true));
    }

    #[test]
    fn overlay_can_exclude_type() {
        let options = CompileOptions::new().overlay(json!({
            "Error": { "exclude-schema": true }
        }));
        let schemas = compile(pet_spec(), &options).unwrap();
        assert_eq!(schemas.names().collect::<Vec<_>>(), vec!["Pet", "Address"]);
    }

    #[test]
    fn overlay_adds_synthetic_properties() {
        let options = CompileOptions::new().overlay(json!({
            "Pet": {
                "additional-properties": {
                    "owner": { "type": "string" },
                    "_id": { "type": "string" }
                }
            }
        }));
        let pet = tree(pet_spec(), &options, "Pet");
        let fields: Vec<&str> = pet.fields().unwrap().keys().collect();
        assert_eq!(fields.last(), Some(&"owner"));
        assert!(pet.field("_id").is_none());
    }

    #[test]
    fn overlay_does_not_leak_between_compilations() {
        let options = CompileOptions::new().overlay(json!({ "default": { "timestamps": true } }));
        compile(pet_spec(), &options).unwrap();

        let schemas = compile(pet_spec(), &CompileOptions::new()).unwrap();
        assert!(schemas.get("Pet").unwrap().options.is_empty());
    }
}

// === Error Handling Tests ===

mod error_handling {
    use super::*;

    #[test]
    fn unrecognized_type_aborts_compilation() {
        let mut spec = pet_spec();
        spec["definitions"]["Error"]["properties"]["amount"] = json!({ "type": "currency" });

        let result = compile(spec, &CompileOptions::new());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnrecognizedType);
        assert!(matches!(
            err,
            CompileError::UnrecognizedType { path, declared }
                if path == "/definitions/Error/properties/amount" && declared == "currency"
        ));
    }

    #[test]
    fn nested_unrecognized_type_reports_path() {
        let spec = json!({
            "definitions": {
                "Person": {
                    "properties": {
                        "wallet": {
                            "type": "array",
                            "items": { "type": "object", "properties": { "cash": { "type": "money" } } }
                        }
                    }
                }
            }
        });
        let result = compile(spec, &CompileOptions::new());
        assert!(matches!(
            result,
            Err(CompileError::UnrecognizedType { path, .. })
                if path == "/definitions/Person/properties/wallet/items/properties/cash"
        ));
    }
}

// === Callback Adapter Tests ===

mod callback {
    use super::*;

    #[test]
    fn success_reaches_result_channel() {
        let mut outcome = None;
        compile_with_callback(pet_spec(), &CompileOptions::new(), |err, schemas| {
            outcome = Some((err.is_none(), schemas.map(|s| s.len())));
        });
        assert_eq!(outcome, Some((true, Some(3))));
    }

    #[test]
    fn failure_reaches_error_channel() {
        let mut outcome = None;
        compile_with_callback("not json", &CompileOptions::new(), |err, schemas| {
            outcome = Some((err.map(|e| e.kind()), schemas.is_none()));
        });
        assert_eq!(outcome, Some((Some(ErrorKind::ParseError), true)));
    }

    #[test]
    fn adapter_matches_direct_call() {
        let direct = compile(person_spec(), &person_options()).unwrap();
        let mut via_callback = None;
        compile_with_callback(person_spec(), &person_options(), |_, schemas| {
            via_callback = schemas;
        });
        assert_eq!(via_callback, Some(direct));
    }
}

// === Concurrency Tests ===

mod concurrency {
    use super::*;

    #[test]
    fn concurrent_compilations_are_isolated() {
        let with_timestamps =
            CompileOptions::new().overlay(json!({ "default": { "timestamps": true } }));
        let plain = CompileOptions::new();

        std::thread::scope(|scope| {
            let a = scope.spawn(|| {
                (0..20)
                    .map(|_| compile(pet_spec(), &with_timestamps).unwrap())
                    .collect::<Vec<_>>()
            });
            let b = scope.spawn(|| {
                (0..20)
                    .map(|_| compile(pet_spec(), &plain).unwrap())
                    .collect::<Vec<_>>()
            });

            for schemas in a.join().unwrap() {
                assert_eq!(schemas.get("Pet").unwrap().options["timestamps"], json!(true));
            }
            for schemas in b.join().unwrap() {
                assert!(schemas.get("Pet").unwrap().options.is_empty());
            }
        });
    }
}
