//! Advisory content attached to stage results.
//!
//! Each stage decides *which* advice applies; the texts live here.

use crate::{Enterotype, PreventionAdvice};
use serde::{Deserialize, Serialize};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Health recommendations
// ============================================================================

/// Why a health recommendation was issued
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Beneficial taxa are depleted
    Probiotics,
    /// Harmful taxa are elevated
    SuppressHarmful,
    /// Several conditional pathogens are above range
    ImmuneBalance,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub category: String,
    pub suggestion: String,
    pub foods: Vec<String>,
}

impl Recommendation {
    pub fn for_kind(kind: RecommendationKind) -> Self {
        let (category, suggestion, foods): (&str, &str, &[&str]) = match kind {
            RecommendationKind::Probiotics => (
                "益生菌补充",
                "建议补充含双歧杆菌和乳酸杆菌的益生菌制剂",
                &["酸奶", "发酵食品", "泡菜", "味噌"],
            ),
            RecommendationKind::SuppressHarmful => (
                "抑制有害菌",
                "增加膳食纤维摄入，减少高脂高糖食物",
                &["全谷物", "蔬菜", "水果", "豆类"],
            ),
            RecommendationKind::ImmuneBalance => (
                "免疫调节",
                "增强免疫力，保持肠道平衡",
                &["大蒜", "生姜", "绿茶", "蘑菇类"],
            ),
        };
        Self {
            kind,
            category: category.into(),
            suggestion: suggestion.into(),
            foods: strings(foods),
        }
    }
}

// ============================================================================
// Enterotype traits
// ============================================================================

/// Description and dietary profile of an enterotype
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnterotypeTraits {
    pub display_name: String,
    pub description: String,
    pub diet_recommendation: String,
    pub health_implications: String,
    pub beneficial_foods: Vec<String>,
    pub avoid_foods: Vec<String>,
}

impl EnterotypeTraits {
    pub fn for_label(label: Enterotype) -> Self {
        let (description, diet, implications, beneficial, avoid): (&str, &str, &str, &[&str], &[&str]) =
            match label {
                Enterotype::BacteroidesDominant => (
                    "以拟杆菌属为主导，常见于高蛋白、高脂肪饮食人群",
                    "增加膳食纤维摄入，减少动物性脂肪",
                    "可能与肥胖风险增加相关，建议控制热量摄入",
                    &["全谷物", "蔬菜", "水果", "豆类"],
                    &["红肉", "加工肉类", "高脂乳制品"],
                ),
                Enterotype::PrevotellaDominant => (
                    "以普氏菌属为主导，常见于高纤维、植物性饮食人群",
                    "保持高纤维饮食，适量增加优质蛋白",
                    "通常与较好的血糖控制相关",
                    &["糙米", "燕麦", "绿叶蔬菜", "坚果"],
                    &["精制糖", "加工食品"],
                ),
                Enterotype::RuminococcusDominant => (
                    "以瘤胃球菌属为主导，混合型饮食模式",
                    "均衡饮食，注意食物多样性",
                    "中间型，需要根据其他指标综合评估",
                    &["发酵食品", "益生元食物", "鱼类"],
                    &["过度加工食品", "含糖饮料"],
                ),
            };
        Self {
            display_name: label.display_name().into(),
            description: description.into(),
            diet_recommendation: diet.into(),
            health_implications: implications.into(),
            beneficial_foods: strings(beneficial),
            avoid_foods: strings(avoid),
        }
    }
}

// ============================================================================
// Disease prevention
// ============================================================================

fn prevention(diet: &str, lifestyle: &str, supplements: &str) -> PreventionAdvice {
    PreventionAdvice {
        diet: diet.into(),
        lifestyle: lifestyle.into(),
        supplements: supplements.into(),
    }
}

/// Built-in disease-specific guidance, keyed by disease name
pub fn builtin_prevention(disease: &str) -> Option<PreventionAdvice> {
    let advice = match disease {
        "IBD" => prevention(
            "增加膳食纤维，避免辛辣刺激食物",
            "规律作息，适度运动，管理压力",
            "益生菌、益生元、Omega-3脂肪酸",
        ),
        "Diabetes" => prevention(
            "低糖低脂饮食，增加全谷物摄入",
            "规律运动，控制体重",
            "膳食纤维、益生菌",
        ),
        "CRC" => prevention(
            "增加蔬果摄入，减少红肉和加工肉类",
            "定期筛查，戒烟限酒",
            "膳食纤维、益生菌、维生素D",
        ),
        "Depression" => prevention(
            "地中海饮食，富含Omega-3的食物",
            "规律运动，充足睡眠，社交活动",
            "益生菌、B族维生素、Omega-3",
        ),
        "CVD" => prevention(
            "低盐低脂饮食，增加蔬果和全谷物",
            "规律运动，控制血压和血脂",
            "膳食纤维、Omega-3、辅酶Q10",
        ),
        _ => return None,
    };
    Some(advice)
}

/// Guidance for diseases without a specific entry
pub fn general_prevention() -> PreventionAdvice {
    prevention("均衡饮食，增加膳食纤维", "规律作息，适度运动", "益生菌、益生元")
}

// ============================================================================
// Rejuvenation advice
// ============================================================================

/// Dietary, lifestyle and supplement suggestions derived from age markers
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RejuvenationAdvice {
    pub dietary: Vec<String>,
    pub lifestyle: Vec<String>,
    pub supplements: Vec<String>,
}

impl RejuvenationAdvice {
    /// Build advice from depleted youth-associated genera and whether any
    /// aging-associated genus is elevated
    pub fn from_markers(depleted_youth: &[&str], aging_elevated: bool) -> Self {
        let mut advice = RejuvenationAdvice::default();

        for genus in depleted_youth {
            match *genus {
                "Bifidobacterium" => {
                    advice.dietary.push("增加酸奶、发酵乳制品摄入".into());
                    advice.supplements.push("补充双歧杆菌益生菌".into());
                }
                "Lactobacillus" => {
                    advice.dietary.push("增加泡菜、酸菜等发酵蔬菜".into());
                    advice.supplements.push("补充乳酸菌益生菌".into());
                }
                "Prevotella" => advice.dietary.push("增加全谷物、豆类摄入".into()),
                "Faecalibacterium" => {
                    advice.dietary.push("增加膳食纤维、抗性淀粉".into());
                    advice.supplements.push("补充益生元（菊粉、低聚果糖）".into());
                }
                _ => {}
            }
        }

        if aging_elevated {
            advice.dietary.push("减少高脂高糖食物".into());
            advice.dietary.push("增加多酚类食物（绿茶、蓝莓、黑巧克力）".into());
            advice.lifestyle.push("规律运动，每周至少150分钟中等强度运动".into());
            advice.lifestyle.push("保证充足睡眠（7-8小时）".into());
        }

        advice.lifestyle.push("管理压力，练习冥想或瑜伽".into());
        advice.lifestyle.push("保持社交活动".into());
        advice.dietary.push("地中海饮食模式".into());
        advice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_enterotype_has_traits() {
        for label in [
            Enterotype::BacteroidesDominant,
            Enterotype::PrevotellaDominant,
            Enterotype::RuminococcusDominant,
        ] {
            let traits = EnterotypeTraits::for_label(label);
            assert_eq!(traits.display_name, label.display_name());
            assert!(!traits.beneficial_foods.is_empty());
            assert!(!traits.avoid_foods.is_empty());
        }
    }

    #[test]
    fn test_builtin_prevention_falls_through_for_unknown() {
        assert!(builtin_prevention("CRC").is_some());
        assert!(builtin_prevention("Eczema").is_none());
        assert!(!general_prevention().diet.is_empty());
    }

    #[test]
    fn test_rejuvenation_advice_from_markers() {
        let baseline = RejuvenationAdvice::from_markers(&[], false);
        assert_eq!(baseline.dietary.len(), 1);
        assert_eq!(baseline.lifestyle.len(), 2);
        assert!(baseline.supplements.is_empty());

        let advice = RejuvenationAdvice::from_markers(&["Bifidobacterium", "Prevotella"], true);
        assert_eq!(advice.supplements, vec!["补充双歧杆菌益生菌"]);
        assert_eq!(advice.dietary.len(), 5);
        assert_eq!(advice.lifestyle.len(), 4);
    }
}
