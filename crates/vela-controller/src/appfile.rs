//! Application parser: resolves definitions and renders every component
//! and trait into an [`AppFile`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use vela_core::oam::{self, kind, label};
use vela_core::{
    Application, ApplicationComponent, ComponentDefinition, OwnerReference, ScopeDefinition,
    ScopeReference, TraitDefinition, WorkloadDefinition,
};
use vela_template::{ConfigEntry, RenderContext, RenderError, Renderer, Template, validate_parameters};

use crate::error::ControllerError;
use crate::registry::DefinitionLookup;

/// An object produced by a template, with the output key it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedObject {
    /// `None` for the primary `output`, the `outputs` key otherwise.
    pub resource: Option<String>,
    pub object: Value,
}

/// One rendered trait, or the workload-composition attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitFile {
    pub trait_type: String,
    /// Primary object first, then auxiliary outputs in key order.
    pub objects: Vec<RenderedObject>,
    /// Validated parameters with defaults filled.
    pub params: Value,
    pub health_policy: Option<String>,
    pub custom_status: Option<String>,
}

impl TraitFile {
    pub fn is_auxiliary(&self) -> bool {
        self.trait_type == oam::AUXILIARY_WORKLOAD
    }
}

/// One rendered component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFile {
    pub name: String,
    pub workload_type: String,
    pub workload: Value,
    pub params: Value,
    /// Declared traits in order, followed by the workload's auxiliary
    /// outputs as a single `AuxiliaryWorkload` entry.
    pub traits: Vec<TraitFile>,
    /// Sorted by scope definition name.
    pub scopes: Vec<ScopeReference>,
    pub health_policy: Option<String>,
    pub custom_status: Option<String>,
}

impl ComponentFile {
    /// The workload-composition attachment, if the workload had `outputs`.
    pub fn auxiliary(&self) -> Option<&TraitFile> {
        self.traits.iter().find(|t| t.is_auxiliary())
    }

    /// Declared traits, without the workload-composition attachment.
    pub fn declared_traits(&self) -> impl Iterator<Item = &TraitFile> {
        self.traits.iter().filter(|t| !t.is_auxiliary())
    }
}

/// Every definition an Application was rendered with, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionClosure {
    pub components: BTreeMap<String, ComponentDefinition>,
    pub workloads: BTreeMap<String, WorkloadDefinition>,
    pub traits: BTreeMap<String, TraitDefinition>,
    pub scopes: BTreeMap<String, ScopeDefinition>,
}

/// Rendered application file for one pass.
#[derive(Debug, Clone)]
pub struct AppFile {
    pub name: String,
    pub namespace: String,
    pub application: Application,
    /// Controller reference to the Application, once it has a uid.
    pub owner: Option<OwnerReference>,
    pub config: Vec<ConfigEntry>,
    pub components: Vec<ComponentFile>,
    pub definitions: DefinitionClosure,
}

impl AppFile {
    pub fn under_rollout(&self) -> bool {
        self.application.is_under_rollout()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentFile> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Template and status expressions resolved for a component type.
struct ResolvedWorkload {
    template: Value,
    health_policy: Option<String>,
    custom_status: Option<String>,
}

/// Builds [`AppFile`]s from Applications.
#[derive(Clone)]
pub struct AppParser {
    lookup: Arc<dyn DefinitionLookup>,
    renderer: Renderer,
}

impl AppParser {
    pub fn new(lookup: Arc<dyn DefinitionLookup>, renderer: Renderer) -> Self {
        Self { lookup, renderer }
    }

    /// Renders every component of `application`.
    ///
    /// Any failure aborts the whole parse; no partial file is returned.
    pub async fn generate_app_file(
        &self,
        application: &Application,
        config: Vec<ConfigEntry>,
    ) -> Result<AppFile, ControllerError> {
        let name = application.name().to_string();
        let namespace = application.namespace().to_string();
        let owner = match application.metadata.uid {
            Some(_) => Some(OwnerReference::controller_of(
                &application.api_version,
                &application.kind,
                &application.metadata,
            )?),
            None => None,
        };

        let mut definitions = DefinitionClosure::default();
        let mut components = Vec::with_capacity(application.spec.components.len());
        for component in &application.spec.components {
            let file = self
                .parse_component(&name, &namespace, &config, component, &mut definitions)
                .await?;
            components.push(file);
        }

        debug!(
            app = %name,
            components = components.len(),
            "Generated app file"
        );

        Ok(AppFile {
            name,
            namespace,
            application: application.clone(),
            owner,
            config,
            components,
            definitions,
        })
    }

    async fn parse_component(
        &self,
        app_name: &str,
        namespace: &str,
        config: &[ConfigEntry],
        component: &ApplicationComponent,
        definitions: &mut DefinitionClosure,
    ) -> Result<ComponentFile, ControllerError> {
        let resolved = self.resolve_workload(namespace, &component.workload_type, definitions)?;

        let context = RenderContext {
            name: component.name.clone(),
            app_name: app_name.to_string(),
            namespace: namespace.to_string(),
            config: config.to_vec(),
            ..Default::default()
        };

        let (params, rendered) = self
            .render(&resolved.template, &component.properties, &context)
            .await
            .map_err(|e| ControllerError::render_component(&component.name, e))?;

        let mut workload = rendered.output.ok_or_else(|| {
            ControllerError::render_component(
                &component.name,
                RenderError::invalid_template("workload template has no output"),
            )
        })?;
        set_labels(
            &mut workload,
            [
                (label::APP_NAME, app_name),
                (label::APP_COMPONENT, component.name.as_str()),
                (label::WORKLOAD_TYPE, component.workload_type.as_str()),
            ],
        );

        // Traits see the rendered workload and its auxiliary outputs.
        let trait_context = context
            .clone()
            .with_output(workload.clone())
            .with_outputs(rendered.outputs.clone());

        let mut traits = Vec::with_capacity(component.traits.len() + 1);
        for declared in &component.traits {
            let definition = self
                .lookup
                .trait_definition(namespace, &declared.trait_type)
                .ok_or_else(|| {
                    ControllerError::definition_not_found(kind::TRAIT_DEFINITION, &declared.trait_type)
                })?;
            let template = definition.template().cloned().ok_or_else(|| {
                ControllerError::render_trait(
                    &component.name,
                    &declared.trait_type,
                    RenderError::invalid_template("trait definition has no schematic template"),
                )
            })?;

            let (trait_params, output) = self
                .render(&template, &declared.properties, &trait_context)
                .await
                .map_err(|e| ControllerError::render_trait(&component.name, &declared.trait_type, e))?;

            let mut objects = Vec::new();
            if let Some(object) = output.output {
                objects.push(RenderedObject {
                    resource: None,
                    object,
                });
            }
            objects.extend(output.outputs.into_iter().map(|(key, object)| RenderedObject {
                resource: Some(key),
                object,
            }));
            for rendered in &mut objects {
                label_trait_object(app_name, &component.name, &declared.trait_type, rendered);
            }

            traits.push(TraitFile {
                trait_type: declared.trait_type.clone(),
                objects,
                params: trait_params,
                health_policy: definition.health_policy().map(str::to_string),
                custom_status: definition.custom_status().map(str::to_string),
            });
            definitions
                .traits
                .insert(declared.trait_type.clone(), (*definition).clone());
        }

        if !rendered.outputs.is_empty() {
            let mut objects: Vec<RenderedObject> = rendered
                .outputs
                .into_iter()
                .map(|(key, object)| RenderedObject {
                    resource: Some(key),
                    object,
                })
                .collect();
            for rendered in &mut objects {
                label_trait_object(app_name, &component.name, oam::AUXILIARY_WORKLOAD, rendered);
            }
            traits.push(TraitFile {
                trait_type: oam::AUXILIARY_WORKLOAD.to_string(),
                objects,
                params: Value::Null,
                health_policy: None,
                custom_status: None,
            });
        }

        let mut scopes = Vec::with_capacity(component.scopes.len());
        for (scope_type, scope_name) in &component.scopes {
            let definition = self
                .lookup
                .scope_definition(namespace, scope_type)
                .ok_or_else(|| ControllerError::definition_not_found(kind::SCOPE_DEFINITION, scope_type))?;
            scopes.push(ScopeReference {
                api_version: definition.spec.reference.api_version.clone(),
                kind: definition.spec.reference.kind.clone(),
                name: scope_name.clone(),
            });
            definitions
                .scopes
                .insert(scope_type.clone(), (*definition).clone());
        }

        Ok(ComponentFile {
            name: component.name.clone(),
            workload_type: component.workload_type.clone(),
            workload,
            params,
            traits,
            scopes,
            health_policy: resolved.health_policy,
            custom_status: resolved.custom_status,
        })
    }

    /// Resolves a component type: ComponentDefinition first, then a
    /// WorkloadDefinition of the same name.
    fn resolve_workload(
        &self,
        namespace: &str,
        workload_type: &str,
        definitions: &mut DefinitionClosure,
    ) -> Result<ResolvedWorkload, ControllerError> {
        if let Some(definition) = self.lookup.component_definition(namespace, workload_type) {
            // A named workload type must exist as well.
            if let Some(referenced) = definition.spec.workload.workload_type.as_deref() {
                let workload = self
                    .lookup
                    .workload_definition(namespace, referenced)
                    .ok_or_else(|| {
                        ControllerError::definition_not_found(kind::WORKLOAD_DEFINITION, referenced)
                    })?;
                definitions
                    .workloads
                    .insert(referenced.to_string(), (*workload).clone());
            }

            let template = definition.template().cloned().ok_or_else(|| {
                missing_template(workload_type, "component definition has no schematic template")
            })?;
            definitions
                .components
                .insert(workload_type.to_string(), (*definition).clone());
            return Ok(ResolvedWorkload {
                template,
                health_policy: definition.health_policy().map(str::to_string),
                custom_status: definition.custom_status().map(str::to_string),
            });
        }

        if let Some(definition) = self.lookup.workload_definition(namespace, workload_type) {
            let template = definition.template().cloned().ok_or_else(|| {
                missing_template(workload_type, "workload definition has no schematic template")
            })?;
            definitions
                .workloads
                .insert(workload_type.to_string(), (*definition).clone());
            return Ok(ResolvedWorkload {
                template,
                health_policy: definition.health_policy().map(str::to_string),
                custom_status: definition.custom_status().map(str::to_string),
            });
        }

        Err(ControllerError::definition_not_found(
            kind::COMPONENT_DEFINITION,
            workload_type,
        ))
    }

    /// Validates parameters and renders; returns the filled parameters too.
    async fn render(
        &self,
        document: &Value,
        properties: &Value,
        context: &RenderContext,
    ) -> Result<(Value, vela_template::RenderOutput), RenderError> {
        let template = Template::parse(document)?;
        let params = validate_parameters(template.parameter_schema(), properties)?;
        let output = self
            .renderer
            .render_template(&template, &params, context)
            .await?;
        Ok((params, output))
    }
}

fn missing_template(workload_type: &str, message: &str) -> ControllerError {
    ControllerError::Render {
        component: workload_type.to_string(),
        trait_type: None,
        source: RenderError::invalid_template(message),
    }
}

fn label_trait_object(app_name: &str, component: &str, trait_type: &str, rendered: &mut RenderedObject) {
    set_labels(
        &mut rendered.object,
        [
            (label::APP_NAME, app_name),
            (label::APP_COMPONENT, component),
            (label::TRAIT_TYPE, trait_type),
        ],
    );
    if let Some(resource) = rendered.resource.clone() {
        set_labels(&mut rendered.object, [(label::TRAIT_RESOURCE, resource.as_str())]);
    }
}

/// Merges `labels` into `metadata.labels`, creating the maps as needed.
/// Non-object documents are left untouched.
pub(crate) fn set_labels<'a>(object: &mut Value, labels: impl IntoIterator<Item = (&'a str, &'a str)>) {
    let Some(root) = object.as_object_mut() else {
        return;
    };
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    let existing = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(existing) = existing.as_object_mut() else {
        return;
    };
    for (key, value) in labels {
        existing.insert(key.to_string(), Value::String(value.to_string()));
    }
}
