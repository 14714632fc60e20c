//! The rewrite driver: parse, providers, emitters, remap, emit.

use std::collections::BTreeSet;

use vesta_classfile::{write_class, Annotation, ClassFile};
use vesta_core::{binary_name, Diagnostic, SANDBOX_PREFIX};

use crate::analysis::{AnalysisConfiguration, AnalysisContext, ClassSummary};
use crate::emitters::{EmitterPipeline, MemberSummary};
use crate::error::{RewriteError, SandboxClassLoadingError};
use crate::policy::{RewriteRules, RESERVED_MEMBER_NAMES};
use crate::profile::ExecutionProfile;
use crate::providers::{standard_providers, ClassDefinition, DefinitionProvider};
use crate::remapper::Remapper;
use crate::resolver::ClassResolver;

/// Everything a rewrite needs, composed once per sandbox configuration.
pub struct RewriteConfiguration {
    resolver: ClassResolver,
    rules: RewriteRules,
    analysis: AnalysisConfiguration,
    profile: Option<ExecutionProfile>,
    providers: Vec<Box<dyn DefinitionProvider>>,
    pipeline: EmitterPipeline,
}

impl RewriteConfiguration {
    pub fn new(
        resolver: ClassResolver,
        rules: RewriteRules,
        analysis: AnalysisConfiguration,
        profile: Option<ExecutionProfile>,
    ) -> Self {
        let pipeline = EmitterPipeline::standard(profile.as_ref());
        Self {
            resolver,
            rules,
            analysis,
            profile,
            providers: standard_providers(),
            pipeline,
        }
    }

    pub fn resolver(&self) -> &ClassResolver {
        &self.resolver
    }

    pub fn rules(&self) -> &RewriteRules {
        &self.rules
    }

    pub fn analysis(&self) -> &AnalysisConfiguration {
        &self.analysis
    }

    pub fn profile(&self) -> Option<&ExecutionProfile> {
        self.profile.as_ref()
    }
}

/// The product of one rewrite.
#[derive(Debug, Clone)]
pub struct RewrittenClass {
    pub host_name: String,
    pub sandbox_name: String,
    pub bytes: Vec<u8>,
    /// Sandbox names this class references, for reachability walks.
    pub references: BTreeSet<String>,
}

/// Rewrite one host class into the sandbox namespace.
///
/// Diagnostics accumulate across the whole walk; a class with any
/// error-severity diagnostic is rejected with every reportable violation in
/// the message, and nothing is emitted for it.
pub fn rewrite_class(
    config: &RewriteConfiguration,
    host_bytes: &[u8],
) -> Result<RewrittenClass, RewriteError> {
    let mut class = ClassFile::parse(host_bytes)?;
    let host_name = class.this_class.clone();
    let sandbox_name = config.resolver.resolve_type(&host_name);

    tracing::debug!(
        target = "vesta.rewrite",
        host = %host_name,
        sandbox = %sandbox_name,
        "rewriting class"
    );

    let mut analysis = AnalysisContext::new(
        &config.analysis,
        ClassSummary {
            host_name: host_name.clone(),
            sandbox_name: sandbox_name.clone(),
            access_flags: class.access_flags,
            super_class: class.super_class.clone(),
            interfaces: class.interfaces.clone(),
            source_file: class.source_file.clone(),
        },
    );

    check_class_version(&class, &mut analysis);
    check_reserved_members(&class, &mut analysis);
    retain_visible_annotations(&mut class, &config.analysis);

    // Class-level definition providers.
    {
        let mut definition = ClassDefinition {
            access_flags: &mut class.access_flags,
            super_class: &mut class.super_class,
            fields: &mut class.fields,
            methods: &mut class.methods,
            this_class: &host_name,
        };
        for provider in &config.providers {
            provider.rewrite_class(&mut definition);
        }
    }
    analysis.class.super_class = class.super_class.clone();
    analysis.class.access_flags = class.access_flags;

    // Member-level definition providers, in list order.
    let summary = analysis.class.clone();
    class.fields = std::mem::take(&mut class.fields)
        .into_iter()
        .map(|field| {
            config
                .providers
                .iter()
                .fold(field, |field, provider| provider.rewrite_field(&summary, field))
        })
        .collect();
    class.methods = std::mem::take(&mut class.methods)
        .into_iter()
        .map(|method| {
            config
                .providers
                .iter()
                .fold(method, |method, provider| {
                    provider.rewrite_method(&summary, method)
                })
        })
        .collect();

    // Instruction emitters.
    for method in &mut class.methods {
        let Some(code) = method.code.take() else {
            continue;
        };
        let member = MemberSummary {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access_flags: method.access_flags,
        };
        let (instructions, growth) = config.pipeline.run(
            &mut analysis,
            &config.resolver,
            &config.rules,
            member,
            &code,
        );
        let mut code = code;
        code.instructions = instructions;
        code.max_stack = code.max_stack.saturating_add(growth);
        method.code = Some(code);
    }

    // Every remaining symbolic name goes through the resolver.
    let (class, mut references) = Remapper::new(&config.resolver).remap_class(class)?;
    references.remove(&sandbox_name);

    if analysis.has_errors() {
        return Err(SandboxClassLoadingError {
            class: binary_name(&host_name),
            diagnostics: analysis.reportable(),
        }
        .into());
    }

    let bytes = write_class(&class)?;
    Ok(RewrittenClass {
        host_name,
        sandbox_name,
        bytes,
        references,
    })
}

fn check_class_version(class: &ClassFile, analysis: &mut AnalysisContext<'_>) {
    let max = analysis.config.max_class_version;
    if class.major_version > max {
        analysis.record(Diagnostic::error(format!(
            "Unsupported class file major version {} (highest supported is {max})",
            class.major_version
        )));
    }
}

/// User classes may not declare the runtime's reserved member names.
fn check_reserved_members(class: &ClassFile, analysis: &mut AnalysisContext<'_>) {
    if class.this_class.starts_with(SANDBOX_PREFIX) {
        // Deterministic-runtime templates legitimately implement these.
        return;
    }
    let declared = class
        .methods
        .iter()
        .map(|m| m.name.as_str())
        .chain(class.fields.iter().map(|f| f.name.as_str()));
    for name in declared {
        if RESERVED_MEMBER_NAMES.contains(&name) {
            analysis.record(Diagnostic::error(format!(
                "Class is not allowed to implement {name}()"
            )));
        }
    }
}

fn retain_visible_annotations(class: &mut ClassFile, config: &AnalysisConfiguration) {
    let keep = |annotation: &Annotation| -> bool {
        annotation
            .type_internal_name
            .as_deref()
            .map(|name| config.visible_annotations.contains(name))
            .unwrap_or(false)
    };
    class.annotations.retain(keep);
    for field in &mut class.fields {
        field.annotations.retain(keep);
    }
    for method in &mut class.methods {
        method.annotations.retain(keep);
    }
}
