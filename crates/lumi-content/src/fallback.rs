//! Canned explanations served when every other tier has failed.
//!
//! Lookup never fails: `topic[level]`, then `topic[1]`, then a generic entry.

use std::collections::{BTreeMap, HashMap};

use crate::curriculum::normalize_topic;
use crate::{ContentMode, ContentRequest};

const GENERIC_EXPLANATION: &str = "### Offline mode\n\n\
The tutor service is busy right now, so here is a short guide while it recovers.\n\n\
1. Read the material again slowly and underline the key terms.\n\
2. Work through the example step by step on paper.\n\
3. Try the quiz; every explanation is available after you answer.\n\n\
You can ask for a fresh explanation again in a minute.";

const REPORT_NOTE: &str = "Your progress summary is shown above. The tutor service is busy, \
so a personalised narrative is not available right now. Keep a steady rhythm: \
short daily sessions beat long occasional ones.";

const ALGEBRA_1: &str = "### Offline guide: linear equations\n\n\
Think of an equation as a balance scale. Whatever you do to one side, do to the other.\n\n\
1. Collect the variable terms on the left and the numbers on the right. A term that crosses the equals sign changes its sign.\n\
2. Divide both sides by the coefficient of the variable.\n\
3. Substitute your answer back to check it.\n\n\
Example: $$2x + 5 = 13 \\Rightarrow 2x = 8 \\Rightarrow x = 4$$";

const ALGEBRA_2: &str = "### Offline guide: systems of equations\n\n\
Two unknowns need two clues. Add or subtract the equations so one variable disappears, \
solve for the other, then substitute back.\n\n\
Example: $$x + y = 10,\\; x - y = 2 \\Rightarrow x = 6,\\; y = 4$$";

const ALGEBRA_3: &str = "### Offline guide: linear inequalities\n\n\
A speed sign that says 60 km/h allows 50 or 55 or 60, but nothing above. \
An inequality describes a whole range of answers, not just one.\n\n\
1. Solve it like an equation: move the numbers, then divide by the coefficient.\n\
2. Multiplying or dividing by a negative number flips the sign.\n\
3. On a number line, a filled dot includes the endpoint and an open dot excludes it.\n\n\
Example: $$3x - 7 \\leq 5 \\Rightarrow 3x \\leq 12 \\Rightarrow x \\leq 4$$";

const ALGEBRA_4: &str = "### Offline guide: quadratic equations\n\n\
A ball thrown upward follows a parabola, the curve of $$ax^2 + bx + c = 0$$.\n\n\
1. Try factoring first: $$x^2 - 5x + 6 = (x - 2)(x - 3)$$, so $$x = 2$$ or $$x = 3$$.\n\
2. Otherwise use the quadratic formula $$x = \\frac{-b \\pm \\sqrt{b^2 - 4ac}}{2a}$$.\n\
3. The discriminant $$D = b^2 - 4ac$$ tells you how many real roots to expect: \
two if positive, one if zero, none if negative.";

const ALGEBRA_5: &str = "### Offline guide: functions\n\n\
A function is a machine: every input goes in and exactly one output comes out.\n\n\
1. Read $$f(x) = 2x + 3$$ as \"double the input, then add three\".\n\
2. To evaluate, substitute: $$f(4) = 2 \\cdot 4 + 3 = 11$$.\n\
3. Real problems become functions too: a taxi fare of 5 plus 2 per km is $$f(k) = 5 + 2k$$.\n\n\
Sketch a small table of inputs and outputs before drawing the graph.";

const TRIGONOMETRY_1: &str = "### Offline guide: right-triangle ratios\n\n\
Remember SOH CAH TOA:\n\n\
- sine = opposite / hypotenuse\n\
- cosine = adjacent / hypotenuse\n\
- tangent = opposite / adjacent\n\n\
Label the sides relative to the angle first, then pick the ratio.";

const TRIGONOMETRY_2: &str = "### Offline guide: special angles\n\n\
Two triangles give every special value.\n\n\
- Half a square (45-45-90) has sides $$1, 1, \\sqrt{2}$$, so $$\\sin 45^\\circ = \\cos 45^\\circ = \\frac{\\sqrt{2}}{2}$$.\n\
- Half an equilateral triangle (30-60-90) has sides $$1, \\sqrt{3}, 2$$, so \
$$\\sin 30^\\circ = \\frac{1}{2}$$ and $$\\cos 30^\\circ = \\frac{\\sqrt{3}}{2}$$.\n\n\
Draw the triangle instead of memorising the table.";

const GEOMETRY_1: &str = "### Offline guide: area of basic shapes\n\n\
Area counts how many unit squares fit inside a shape.\n\n\
- Rectangle: length times width.\n\
- Triangle: half of base times height, because two copies make a rectangle.\n\
- Circle: $$\\pi r^2$$.\n\n\
Check the units: lengths in cm give an area in square cm.";

/// Topic- and level-keyed canned content.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    topics: HashMap<String, BTreeMap<u32, String>>,
    generic: String,
}

impl Default for FallbackStore {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackStore {
    /// Creates a store holding only the generic entry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            topics: HashMap::new(),
            generic: GENERIC_EXPLANATION.to_string(),
        }
    }

    /// Creates the store with the entries shipped with the crate.
    #[must_use]
    pub fn builtin() -> Self {
        Self::empty()
            .with_entry("algebra", 1, ALGEBRA_1)
            .with_entry("algebra", 2, ALGEBRA_2)
            .with_entry("algebra", 3, ALGEBRA_3)
            .with_entry("algebra", 4, ALGEBRA_4)
            .with_entry("algebra", 5, ALGEBRA_5)
            .with_entry("trigonometry", 1, TRIGONOMETRY_1)
            .with_entry("trigonometry", 2, TRIGONOMETRY_2)
            .with_entry("geometry", 1, GEOMETRY_1)
    }

    /// Adds or replaces an entry. Blank text is ignored.
    #[must_use]
    pub fn with_entry(mut self, topic: &str, level: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.topics
                .entry(normalize_topic(topic))
                .or_default()
                .insert(level, text);
        }
        self
    }

    /// Returns the best canned explanation for (topic, level).
    pub fn lookup(&self, topic: &str, level: u32) -> &str {
        self.topics
            .get(&normalize_topic(topic))
            .and_then(|levels| levels.get(&level).or_else(|| levels.get(&1)))
            .map_or(self.generic.as_str(), String::as_str)
    }

    /// Returns the offline text for a request, shaped by its mode.
    pub fn offline_text(&self, request: &ContentRequest) -> String {
        match request.mode() {
            ContentMode::Explain => self.lookup(request.topic(), request.level()).to_string(),
            ContentMode::Welcome => format!(
                "Welcome to level {} of {}! Let's go through the material one step at a time.",
                request.level(),
                request.topic().trim()
            ),
            ContentMode::Report => REPORT_NOTE.to_string(),
        }
    }
}
