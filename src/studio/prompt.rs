use crate::studio::selection::Selection;

pub const SYSTEM_PREAMBLE: &str = "You are a Lead Technical Photographer for a high-fashion digital studio.
TASK: Generate a master-quality 8K photograph.

ASSET HIERARCHY:
1. IDENTITY (Face Image): Use this image for face identity. Their facial features must be 100% IDENTICAL.
2. GARMENT (Outfit Image): Replicate the exact clothing from this image (color, texture, pattern).
3. ITEM (Product Image): Integrate this specific item naturally if provided.

STANDARDS:
- Output must be a real DSLR photo (8k resolution).
- NO AI smoothing unless explicitly requested.
- Precise composition based on technical specs.

Context:";

pub const CLOSING_CONSTRAINTS: &str =
    "Maintain identical face identity. Replicate the outfit exactly.";

const CLAUSE_SEPARATOR: &str = ". ";

fn clause(text: &str) -> Option<&str> {
    let trimmed = text.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Builds the instruction sent with the reference images.
///
/// Clause order is fixed: preamble, lighting, skin texture, pose (when one is
/// selected), free text (when non-empty), `Variation: <modifier>`, closing
/// constraints. Identical inputs always produce the identical string.
pub fn compose_prompt(selection: &Selection, variation: Option<&str>) -> String {
    let mut clauses: Vec<String> = Vec::with_capacity(6);

    clauses.extend(clause(&selection.lighting().prompt).map(str::to_string));
    clauses.extend(clause(&selection.skin_texture().prompt).map(str::to_string));
    if let Some(pose) = selection.pose() {
        clauses.extend(clause(&pose.prompt).map(str::to_string));
    }
    clauses.extend(clause(selection.directive()).map(str::to_string));
    if let Some(modifier) = variation.and_then(clause) {
        clauses.push(format!("Variation: {modifier}"));
    }

    let mut body = clauses.join(CLAUSE_SEPARATOR);
    if !body.is_empty() {
        body.push_str(CLAUSE_SEPARATOR);
    }
    format!("{SYSTEM_PREAMBLE} {body}{CLOSING_CONSTRAINTS}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::catalog::{AspectRatio, Catalog};
    use crate::studio::selection::{ImageAsset, ImageSlot};

    fn ready_selection(catalog: &Catalog) -> Selection {
        let mut selection = Selection::new(catalog);
        selection.set_image(ImageSlot::Identity, ImageAsset::from_bytes(vec![1]).unwrap());
        selection.set_image(ImageSlot::Outfit, ImageAsset::from_bytes(vec![2]).unwrap());
        selection
    }

    #[test]
    fn rooftop_scenario_matches_expected_prompt() {
        let catalog = Catalog::builtin();
        let mut selection = ready_selection(&catalog);
        selection.select_lighting(catalog.lighting_preset("studio").unwrap());
        selection.select_skin_texture(catalog.skin_texture("natural").unwrap());
        selection.select_aspect_ratio(AspectRatio::Square);
        selection.set_directive("sunset rooftop");

        let expected = format!(
            "{SYSTEM_PREAMBLE} high-end commercial studio lighting, soft box, rim light, sharp details. \
             Hyper-realistic skin with visible pores, fine lines, and natural textures. Maximum authenticity. \
             sunset rooftop. {CLOSING_CONSTRAINTS}"
        );
        let prompt = compose_prompt(&selection, None);
        assert_eq!(prompt, expected);
        for pose in catalog.poses() {
            assert!(!prompt.contains(pose.prompt.trim_end_matches('.')));
        }
    }

    #[test]
    fn always_starts_with_preamble_and_ends_with_closing() {
        let catalog = Catalog::builtin();
        for pose in catalog.poses().iter().map(Some).chain([None]) {
            for lighting in catalog.lighting() {
                let mut selection = ready_selection(&catalog);
                selection.select_lighting(lighting);
                if let Some(pose) = pose {
                    selection.toggle_pose(pose);
                }
                let prompt = compose_prompt(&selection, Some("Soft lens bloom effect"));
                assert!(prompt.starts_with(SYSTEM_PREAMBLE));
                assert!(prompt.ends_with(CLOSING_CONSTRAINTS));
            }
        }
    }

    #[test]
    fn pose_precedes_free_text() {
        let catalog = Catalog::builtin();
        let mut selection = ready_selection(&catalog);
        selection.toggle_pose(catalog.pose("runway").unwrap());
        selection.set_directive("red carpet at night");

        let prompt = compose_prompt(&selection, None);
        let pose_at = prompt.find("Fashion week runway photography").unwrap();
        let text_at = prompt.find("red carpet at night").unwrap();
        assert!(pose_at < text_at);
        assert!(!prompt.contains(".."));
    }

    #[test]
    fn empty_free_text_leaves_no_placeholder() {
        let catalog = Catalog::builtin();
        let mut selection = ready_selection(&catalog);
        selection.set_directive("   ");

        let prompt = compose_prompt(&selection, None);
        assert!(prompt.ends_with(&format!("Maximum authenticity. {CLOSING_CONSTRAINTS}")));
        assert!(!prompt.contains(". . "));
    }

    #[test]
    fn variation_clause_is_inserted_before_closing_constraints() {
        let catalog = Catalog::builtin();
        let mut selection = ready_selection(&catalog);
        selection.set_directive("neon alley");

        let base = compose_prompt(&selection, None);
        let varied = compose_prompt(&selection, Some("Soft lens bloom effect"));

        assert!(varied.contains("neon alley. Variation: Soft lens bloom effect. "));
        assert_eq!(
            varied.replace("Variation: Soft lens bloom effect. ", ""),
            base
        );
        assert!(!base.contains("Variation:"));
    }

    #[test]
    fn composition_is_deterministic() {
        let catalog = Catalog::builtin();
        let mut selection = ready_selection(&catalog);
        selection.toggle_pose(catalog.pose("campaign").unwrap());
        selection.set_directive("marble lobby");

        assert_eq!(
            compose_prompt(&selection, Some("Slightly different camera angle")),
            compose_prompt(&selection.clone(), Some("Slightly different camera angle"))
        );
    }
}
