//! Instruction templates for the scenario-structuring step.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the target schema or an
//!    extraction rule requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the rendered prompt directly
//!    without calling a real generation service, making template regressions
//!    easy to catch.

/// System instruction for the structuring call.
pub const STRUCTURING_SYSTEM_PROMPT: &str = "You are a precise JSON parser that extracts SAQ data while preserving all content and identifying image associations. You structure clinical scenarios with their associated questions.";

const SCHEMA_INSTRUCTIONS: &str = r#"You will be provided with SAQ (Short Answer Questions) data. You must output them in a JSON format representing scenarios with their associated questions.

Structure your response as an array of scenario objects, each with the following keys:

- parentQuestion (string): The main scenario/case description
- moduleId (integer): The module/category ID for this scenario
- hasImage (boolean): True if this scenario has an associated image
- imagePosition (integer): If hasImage is true, which extracted image corresponds to this scenario (starting from 0)
- childQuestions (array): Array of individual questions for this scenario, each containing:
  - questionLead (string): The specific question being asked
  - idealAnswer (string): The expected/ideal answer
  - keyConcept (string): The main concept being tested

When parsing scenarios, look for any references to images, figures, diagrams, ECGs, X-rays, or visual elements.
If you detect that a scenario refers to or requires an image (like "based on the ECG above", "the X-ray shows", "refer to the image"), set hasImage to true.
For imagePosition, use the order in which images appear in the document (0 for first image, 1 for second, and so on).

CRITICAL INSTRUCTIONS:
- YOU MUST parse ALL scenarios in the text, not just the first one
- Each scenario should be a complete case with multiple related questions
- INCLUDE ALL answer details - never summarize
- RETAIN EVERY WORD from the ideal answers in the document
- Make sure moduleId is always an integer
- Pay attention to any image references in the text and set hasImage/imagePosition accordingly
- Group related questions under the same parent scenario
- Output ONLY the JSON value, with no commentary"#;

/// Build the user prompt for one document's extracted text.
///
/// `image_count` tells the model how many images the extractor actually
/// found, so it never declares an `imagePosition` the reconciler could not
/// resolve for a document with no images at all.
pub fn structuring_prompt(text: &str, image_count: usize) -> String {
    let image_context = if image_count > 0 {
        format!("IMPORTANT: This document contains {image_count} extracted images.")
    } else {
        "Note: No images were found in this document.".to_string()
    };

    format!("{SCHEMA_INSTRUCTIONS}\n\n{image_context}\n\nText to parse:\n{text}")
}
