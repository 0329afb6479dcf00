//! Prompt templates for the text-generation steps
//!
//! Templates keep the deployed Spanish wording; placeholders use `{name}`
//! syntax and rendering fails loudly when one is left unresolved, so a
//! template change cannot silently ship a half-filled prompt.

use regex::Regex;
use resol_core::RelevanceHit;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unresolved prompt placeholder: {0}")]
    UnresolvedPlaceholder(String),
}

pub const SYSTEM_PROMPT: &str = "\
Eres un experto en resolución de problemas industriales y gestión de conocimiento empresarial.

Tu rol es ayudar a resolver problemas basándote en casos históricos de la empresa.

## TU COMPORTAMIENTO:
1. SIEMPRE pregunta primero: \"¿Qué aprendimos la última vez que pasó esto?\"
2. Si hay casos similares en el contexto, MENCIÓNALOS primero
3. Si no hay casos similares, ayuda a DOCUMENTAR el nuevo caso
4. Sé CONCISO y DIRECTO
5. Usa ESPAÑOL siempre
6. Estructura tus respuestas cuando sea apropiado

## CUANDO ANALICES UN PROBLEMA:
1. Identifica palabras clave del problema
2. Relaciona con casos anteriores si los hay
3. Sugiere soluciones basadas en histórico
4. Si es nuevo, guía la documentación completa

## FORMATO DE RESPUESTA:
Cuando respondas sobre un problema, usa esta estructura si es apropiada:

**Análisis del Problema:**
[Tu análisis]

**Casos Relacionados:**
[Referencias a casos similares si existen]

**Recomendación:**
[Tu sugerencia de acción]

**Para Documentar:**
[Qué información adicional se necesita]";

pub const SIMILARITY_ANALYSIS: &str = "\
Analiza si el siguiente problema nuevo es similar a los casos históricos proporcionados.

## PROBLEMA NUEVO:
{problema_nuevo}

## CASOS HISTÓRICOS:
{casos_historicos}

## RESPONDE EN ESTE FORMATO:

### 1. CASO MÁS SIMILAR
- Versión: [identificador del caso]
- Similitud: [porcentaje estimado]
- Razón: [por qué es similar]

### 2. ELEMENTOS COMUNES
- [elemento 1]
- [elemento 2]

### 3. DIFERENCIAS CLAVE
- [diferencia 1]
- [diferencia 2]

### 4. RECOMENDACIÓN
[Indica si se puede aplicar la solución anterior o si es un caso nuevo]

### 5. INFORMACIÓN ADICIONAL NECESARIA
[Qué preguntas hacer para confirmar]

Sé específico y conciso.";

pub const DOCUMENTATION_QUESTIONS: &str = "\
Basándote en este problema reportado, genera preguntas clave para documentar el caso completamente.

## PROBLEMA REPORTADO:
{descripcion}

## ÁREA:
{area}

## GENERA 5 PREGUNTAS que cubran:
1. Temporalidad (cuándo empezó, frecuencia)
2. Acciones previas (qué se ha intentado)
3. Personas involucradas
4. Impacto (qué afecta, magnitud)
5. Condiciones (qué lo reproduce, variables)

Formato: Lista numerada, preguntas directas y específicas.
Evita preguntas genéricas. Adapta al contexto del problema.";

pub const CASE_REPORT_8D: &str = "\
Genera un documento 8D profesional basado en la siguiente información.

## INFORMACIÓN DEL CASO:

**Título:** {titulo}
**Área:** {area}
**Prioridad:** {prioridad}
**Fecha de Creación:** {fecha_creacion}

**Descripción del Problema:**
{descripcion}

**Reportes de Involucrados:**
{reportes}

**Solución Aplicada:**
{solucion}

**Causa Raíz Identificada:**
{causa_raiz}

**Acciones Preventivas:**
{acciones_preventivas}

## GENERA EL DOCUMENTO 8D:

### D1 - EQUIPO
[Lista las personas que participaron en la resolución]

### D2 - DESCRIPCIÓN DEL PROBLEMA
[Resumen claro: Qué, Dónde, Cuándo, Magnitud]

### D3 - ACCIONES DE CONTENCIÓN
[Medidas inmediatas tomadas para contener el problema]

### D4 - ANÁLISIS DE CAUSA RAÍZ
[Usa 5 Por Qués o Diagrama de Ishikawa si es apropiado]

### D5 - ACCIONES CORRECTIVAS PERMANENTES
[Soluciones implementadas para eliminar la causa raíz]

### D6 - IMPLEMENTACIÓN Y VALIDACIÓN
[Cómo se verificó que las acciones funcionan]

### D7 - ACCIONES PREVENTIVAS
[Medidas para evitar recurrencia en otros procesos/áreas]

### D8 - RECONOCIMIENTO Y CIERRE
[Lecciones aprendidas y reconocimiento al equipo]

---
Fecha: {fecha_generacion}";

pub const QUERY_WITH_CONTEXT: &str = "\
Responde la siguiente consulta usando el conocimiento histórico proporcionado.

## CONTEXTO (Casos anteriores relevantes):
{contexto}

## CONSULTA DEL USUARIO:
{consulta}

## INSTRUCCIONES:
1. Basa tu respuesta en los casos del contexto cuando sea posible
2. Si un caso anterior aplica directamente, menciónalo con su versión
3. Si no hay casos relevantes, indícalo claramente
4. Sugiere documentar si es un caso nuevo
5. Sé práctico y orientado a la acción

## RESPUESTA:";

pub const QUERY_WITHOUT_CONTEXT: &str = "\
El usuario hace la siguiente consulta, pero no hay casos similares en la base de conocimiento.

## CONSULTA:
{consulta}

## INSTRUCCIONES:
1. Proporciona orientación general basada en buenas prácticas
2. Indica que no hay casos históricos documentados
3. Sugiere que este podría ser un caso nuevo a documentar
4. Pregunta si quiere crear una incidencia para empezar a construir el conocimiento

## RESPUESTA:";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[a-z_]+\}").expect("valid regex"))
}

/// Fill a template's `{name}` placeholders
///
/// Validated against the template itself, so substituted values containing
/// braces cannot cause a false failure.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
    for m in placeholder_regex().find_iter(template) {
        let name = m.as_str().trim_matches(|c| c == '{' || c == '}');
        if !vars.iter().any(|(n, _)| *n == name) {
            return Err(PromptError::UnresolvedPlaceholder(m.as_str().to_string()));
        }
    }

    let mut result = template.to_string();
    for (name, value) in vars {
        result = result.replace(&format!("{{{name}}}"), value);
    }
    Ok(result)
}

/// Format retrieved cases as a block for the similarity-analysis prompt
pub fn format_cases_for_prompt(cases: &[RelevanceHit]) -> String {
    if cases.is_empty() {
        return "No hay casos históricos disponibles.".to_string();
    }

    cases
        .iter()
        .enumerate()
        .map(|(i, case)| {
            let mut text = format!("### Caso {}", i + 1);
            if let Some(version) = &case.metadata.version {
                text.push_str(&format!(" ({version})"));
            }
            if let Some(area) = &case.metadata.area {
                text.push_str(&format!("\n**Área:** {area}"));
            }
            if let Some(fecha) = &case.metadata.timestamp {
                text.push_str(&format!("\n**Fecha:** {}", fecha.to_rfc3339()));
            }
            text.push_str(&format!("\n**Relevancia:** {}", case.relevance_pct()));
            text.push_str(&format!("\n\n{}\n", case.content));
            text
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub fn msg_cases_found(n: usize) -> String {
    format!("Encontré {n} caso(s) similar(es) en la base de conocimiento.")
}

pub fn msg_no_cases() -> String {
    "No encontré casos similares. Este parece ser un caso nuevo.".to_string()
}

pub fn msg_document_new() -> String {
    "Vamos a documentar este caso para que sirva en el futuro.".to_string()
}

pub fn msg_cycle_closed(version: &str) -> String {
    format!("Ciclo cerrado. Conocimiento heredado como {version}.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use resol_core::DocMetadata;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let prompt = render(
            QUERY_WITH_CONTEXT,
            &[("contexto", "casos..."), ("consulta", "¿qué pasó?")],
        )
        .unwrap();
        assert!(prompt.contains("casos..."));
        assert!(prompt.contains("¿qué pasó?"));
        assert!(!prompt.contains("{consulta}"));
    }

    #[test]
    fn test_render_errors_on_missing_variable() {
        let err = render(QUERY_WITH_CONTEXT, &[("consulta", "x")]).unwrap_err();
        assert!(matches!(err, PromptError::UnresolvedPlaceholder(_)));
    }

    #[test]
    fn test_format_cases_includes_metadata_headers() {
        let cases = vec![RelevanceHit {
            id: Some("a".into()),
            content: "Caso de porosidad".into(),
            metadata: DocMetadata {
                version: Some("SOLDADURA_v1.0".into()),
                area: Some("SOLDADURA".into()),
                ..Default::default()
            },
            relevance: 0.85,
            rank: 1,
        }];

        let block = format_cases_for_prompt(&cases);
        assert!(block.contains("### Caso 1 (SOLDADURA_v1.0)"));
        assert!(block.contains("**Área:** SOLDADURA"));
        assert!(block.contains("**Relevancia:** 85.0%"));
        assert!(block.contains("Caso de porosidad"));
    }

    #[test]
    fn test_format_cases_empty_sentinel() {
        assert_eq!(
            format_cases_for_prompt(&[]),
            "No hay casos históricos disponibles."
        );
    }
}
